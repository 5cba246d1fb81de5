use std::time::Duration;

/// Rate ticks: target rate and step progression are re-evaluated once per `TICK`.
pub const TICK: Duration = Duration::from_secs(1);

/// Spawn sub-ticks per rate tick.
pub const SUB_TICKS: u64 = 10;

pub const SUB_TICK: Duration = Duration::from_millis(100);

/// Users to launch in sub-tick `sub_tick` (0-based) of a second whose budget is `budget`.
///
/// The remainder is spread one extra user per low sub-tick index, so the ten counts of a second
/// always add up to exactly `budget`.
pub fn spawn_count(budget: u64, sub_tick: u64) -> u64 {
    let base = budget / SUB_TICKS;
    let remainder = budget % SUB_TICKS;
    base + u64::from(sub_tick < remainder)
}

/// Turns per-second target rates into per-sub-tick launch counts.
///
/// The target rate is the number of users the profile wants launched by the end of the current
/// second. Each rate tick budgets the difference to what has already been launched, so a held
/// rate launches nothing new and a ramp launches only its increments.
#[derive(Debug, Default)]
pub struct SpawnPacer {
    launched: u64,
    budget: u64,
    sub_tick: u64,
    rate: u64,
}

impl SpawnPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new second at `rate` and resets the sub-tick index.
    pub fn start_second(&mut self, rate: u64) {
        self.rate = rate;
        self.budget = rate.saturating_sub(self.launched);
        self.sub_tick = 0;
    }

    /// Launch count for the next sub-tick; counts are recorded as launched.
    pub fn next_sub_tick(&mut self) -> u64 {
        if self.sub_tick >= SUB_TICKS {
            return 0;
        }
        let n = spawn_count(self.budget, self.sub_tick);
        self.sub_tick += 1;
        self.launched = self.launched.saturating_add(n);
        n
    }

    /// Whether the next sub-tick opens a new second.
    pub fn at_second_boundary(&self) -> bool {
        self.sub_tick == 0 || self.sub_tick >= SUB_TICKS
    }

    /// Rate computed at the last rate tick.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn launched(&self) -> u64 {
        self.launched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_sub_ticks_sum_to_budget() {
        for budget in 0..1000 {
            let total: u64 = (0..SUB_TICKS).map(|i| spawn_count(budget, i)).sum();
            assert_eq!(total, budget, "budget {budget}");
        }
    }

    #[test]
    fn remainder_goes_to_lowest_sub_ticks() {
        let counts: Vec<u64> = (0..SUB_TICKS).map(|i| spawn_count(23, i)).collect();
        assert_eq!(counts, vec![3, 3, 3, 2, 2, 2, 2, 2, 2, 2]);
    }

    #[test]
    fn pacer_spawns_increments_only() {
        let mut pacer = SpawnPacer::new();

        pacer.start_second(10);
        let first: u64 = (0..SUB_TICKS).map(|_| pacer.next_sub_tick()).sum();
        assert_eq!(first, 10);

        // Holding the same rate launches nobody new.
        pacer.start_second(10);
        let second: u64 = (0..SUB_TICKS).map(|_| pacer.next_sub_tick()).sum();
        assert_eq!(second, 0);

        pacer.start_second(25);
        let third: u64 = (0..SUB_TICKS).map(|_| pacer.next_sub_tick()).sum();
        assert_eq!(third, 15);
        assert_eq!(pacer.launched(), 25);
    }

    #[test]
    fn extra_sub_ticks_never_overspawn() {
        let mut pacer = SpawnPacer::new();
        pacer.start_second(7);
        let total: u64 = (0..SUB_TICKS + 5).map(|_| pacer.next_sub_tick()).sum();
        assert_eq!(total, 7);
        assert!(pacer.at_second_boundary());
    }

    #[test]
    fn lower_rate_launches_nothing() {
        let mut pacer = SpawnPacer::new();
        pacer.start_second(20);
        (0..SUB_TICKS).for_each(|_| {
            pacer.next_sub_tick();
        });
        pacer.start_second(5);
        let total: u64 = (0..SUB_TICKS).map(|_| pacer.next_sub_tick()).sum();
        assert_eq!(total, 0);
        assert_eq!(pacer.rate(), 5);
    }
}

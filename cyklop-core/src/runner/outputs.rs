use std::path::{Path, PathBuf};

use super::error::Result;

/// Creates `<base_dir>/<scenario>-<YYYYmmdd-HHMMSS>` and returns its path.
///
/// Characters outside `[A-Za-z0-9_.-]` in the scenario name become `_`. If the directory already
/// exists (two runs within the same second) a numeric suffix is appended.
pub fn create_run_dir(base_dir: &Path, scenario_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(base_dir)?;

    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let stem = format!("{}-{stamp}", sanitize(scenario_name));

    let mut candidate = base_dir.join(&stem);
    let mut n = 1u32;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = base_dir.join(format!("{stem}-{n}"));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn sanitize(name: &str) -> String {
    let clean: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let clean = clean.trim_matches('.');
    if clean.is_empty() {
        "scenario".to_string()
    } else {
        clean.to_string()
    }
}

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::UserClient;

pub type VuError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type VuFuture = Pin<Box<dyn Future<Output = Result<(), VuError>> + Send + 'static>>;

/// Behavior executed once per spawned virtual user.
///
/// Returning an error (or panicking) only ends that user; the run carries on.
pub trait UserBehavior: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self, vu: VirtualUser) -> VuFuture;
}

/// [`UserBehavior`] backed by an async closure. See [`user_fn`].
pub struct UserFn<F> {
    name: String,
    f: F,
}

impl<F, Fut> UserBehavior for UserFn<F>
where
    F: Fn(VirtualUser) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), VuError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, vu: VirtualUser) -> VuFuture {
        Box::pin((self.f)(vu))
    }
}

pub fn user_fn<F, Fut>(name: impl Into<String>, f: F) -> UserFn<F>
where
    F: Fn(VirtualUser) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), VuError>> + Send + 'static,
{
    UserFn {
        name: name.into(),
        f,
    }
}

static NEXT_VU_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn reset_vu_ids() {
    NEXT_VU_ID.store(1, Ordering::Relaxed);
}

pub(crate) fn next_vu_id() -> u64 {
    NEXT_VU_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle given to a running user behavior.
#[derive(Clone)]
pub struct VirtualUser {
    id: u64,
    name: Arc<str>,
    client: UserClient,
}

impl VirtualUser {
    pub(crate) fn new(id: u64, name: Arc<str>, client: UserClient) -> Self {
        Self { id, name, client }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// `<behavior>_<id>`; also the `user` column of every result this user produces.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &UserClient {
        &self.client
    }

    /// Think time between actions.
    pub async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl fmt::Debug for VirtualUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualUser")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

use crate::auth::Authorizer;
use crate::backup::SubmissionLog;
use crate::lock::{Clock, LockManager};
use crate::notify::PostmarkNotifier;
use crate::settings::SettingsService;
use crate::storage::BucketClient;
use std::sync::Arc;

pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub submissions: SubmissionLog,
    pub locks: LockManager,
    pub settings: SettingsService,
    pub authorizer: Authorizer,
    pub bucket: Option<BucketClient>,
    pub notifier: Option<PostmarkNotifier>,
}

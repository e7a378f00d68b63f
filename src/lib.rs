#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;

pub mod api;
pub mod dispatch;
pub mod forecast;
pub mod health;
pub mod metrics;
pub mod model;
pub mod processor;
pub mod publisher;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod shutdown;

use std::time::Duration;

/// Exit status of a clean shutdown.
pub const EXIT_CODE_OK: i32 = 0;
/// Exit status when the configuration is rejected.
pub const EXIT_CODE_INVALID_CONFIG: i32 = 1;
/// Exit status asking the supervisor to start the bridge again.
pub const EXIT_CODE_RESTART_REQUIRED: i32 = 2;

/// Consecutive failed requests tolerated before a restart.
pub const MAX_REQUEST_FAILURES: u32 = 4;
pub const MAX_LOGIN_FAILURES: u32 = 4;

/// Applied to every outgoing HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

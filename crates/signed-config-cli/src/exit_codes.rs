//! Exit codes of the `signed-config` binary.
//!
//! Failed fetches exit with `ConfigError::exit_code()`:
//! 1 config, 2 auth, 4 rejected payload, 5 network/server, 6 local storage.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INTERNAL_ERROR: i32 = 7; // setup failed before any command ran
pub const EXIT_KEY_MISSING: i32 = 3; // `get` without fallback on an absent key

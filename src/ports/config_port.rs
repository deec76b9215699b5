//! Configuration access port trait.
//!
//! Lookups are by INI section and key. Blank values read as absent, and
//! unparseable numbers fall back to the caller's default so that range
//! checks stay in `config_validation`.

use std::time::Duration;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Fractional seconds as a [`Duration`]; negative values clamp to zero.
    fn get_secs(&self, section: &str, key: &str, default: Duration) -> Duration {
        let secs = self.get_double(section, key, default.as_secs_f64());
        if secs.is_finite() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            default
        }
    }
}

//! Used when the `logging` feature is off: no global logger is installed, but the public logging
//! API keeps working and the `log` macros respect the configured maximum level.

use crate::log::LogConfiguration;

impl LogConfiguration {
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

/// Logging handle passed into components at construction.
///
/// Records go to the injected [`Log`] under a per-component target. The
/// default handle forwards to whatever global logger `main` installed.
#[derive(Clone)]
pub struct Diagnostics {
    logger: Arc<dyn Log>,
    target: String,
}

impl Diagnostics {
    pub fn new(logger: Arc<dyn Log>, target: impl Into<String>) -> Self {
        Self {
            logger,
            target: target.into(),
        }
    }

    /// Forward to the process-wide logger.
    pub fn global(target: impl Into<String>) -> Self {
        Self::new(Arc::new(GlobalLogger), target)
    }

    /// Same sink, different target.
    pub fn scoped(&self, target: impl Into<String>) -> Self {
        Self::new(Arc::clone(&self.logger), target)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(&self.target).build();
        if !self.logger.enabled(&metadata) {
            return;
        }
        self.logger.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::global(crate::APP_NAME)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_carry_target_and_level() {
        let (logger, diag) = capture::diagnostics("rbcast::resolver");
        diag.error(format_args!("open failed: {}", "locked"));
        diag.debug(format_args!("scan"));

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, Level::Error);
        assert_eq!(entries[0].1, "rbcast::resolver");
        assert_eq!(entries[0].2, "open failed: locked");
    }

    #[test]
    fn test_scoped_shares_sink() {
        let (logger, diag) = capture::diagnostics("rbcast");
        let child = diag.scoped("rbcast::formatter");
        child.warn(format_args!("bpm not numeric"));
        assert_eq!(child.target(), "rbcast::formatter");
        assert!(logger.contains(Level::Warn, "bpm not numeric"));
    }
}

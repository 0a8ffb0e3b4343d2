use evlog::{LogEventConsolePrinter, Logger};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

pub fn console_logger() -> Logger {
    let mut logger = Logger::default();
    logger.register(LogEventConsolePrinter::default());
    logger
}

/// Installs the process logger. Only the first call takes effect.
pub fn set_logger(logger: Logger) {
    let _ = LOGGER.set(logger);
}

/// Falls back to a logger without printers when nothing was installed, e.g. under test.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::default)
}

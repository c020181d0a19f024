pub mod formatters;

pub use formatters::{create_formatter, ConsoleFormatter, CsvFormatter, DataFormatter, JsonFormatter};

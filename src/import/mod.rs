mod csv_import;
mod detect;
mod statement;

pub(crate) use csv_import::{parse_decimal, CsvImporter, CsvProfile};
pub(crate) use detect::detect_statement_format;
pub(crate) use statement::{import_statement_file, SOURCE_CC_SLIP};

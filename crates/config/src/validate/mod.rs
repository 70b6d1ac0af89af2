//! Non-fatal configuration checks
//!
//! Hard errors are reported by [`Config::validate`](crate::Config::validate);
//! this module collects warnings about settings that are legal but likely
//! not what an operator wants.

mod lint;

pub use lint::lint_config;

/// A single lint warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub message: String,
}

impl ValidationWarning {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Accumulated lint output
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

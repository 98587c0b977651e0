//! indimap-core: cell mapping and formula evaluation for indicator imports
//!
//! Two workbooks are uploaded for every reporting period: HC (health
//! centers) and HOSP (hospitals). Mapping rules say where each indicator's
//! value lives in them; this library decodes the workbooks, resolves the
//! cells (merged regions, Khmer digits, locale separators) and evaluates the
//! rule formulas into preview rows.

pub mod config;
pub mod error;
pub mod formula;
pub mod mapping;
pub mod number;
pub mod reader;
pub mod resolver;

use anyhow::{Context, Result};
use std::path::Path;

pub use config::{PreviewConfig, PreviewOptions};
pub use error::{DecodeError, FormulaError, MappingError};
pub use formula::{EvalContext, eval_result_formula, split_args_top_level};
pub use mapping::{Indicator, MappingRule, MappingSet, PreviewReport, PreviewRow};
pub use number::{NumberParser, ParsedNumber, SeparatorPolicy, UnparsedText, parse_locale_number};
pub use reader::{Workbook, WorkbookDecoder, read_workbook};
pub use resolver::Resolver;

/// Main preview interface
pub struct Previewer {
    config: PreviewConfig,
}

impl Previewer {
    /// Create a previewer with default configuration
    pub fn new() -> Self {
        Self::with_config(PreviewConfig::default())
    }

    pub fn with_config(config: PreviewConfig) -> Self {
        Self { config }
    }

    /// Preview a mapping set against already decoded workbooks
    pub fn preview(
        &self,
        hc: Option<&Workbook>,
        hosp: Option<&Workbook>,
        set: &MappingSet,
    ) -> PreviewReport {
        mapping::preview(hc, hosp, set, &self.config)
    }

    /// Decode the given files and preview a mapping set against them
    pub fn preview_files<P: AsRef<Path>>(
        &self,
        hc: Option<P>,
        hosp: Option<P>,
        set: &MappingSet,
    ) -> Result<PreviewReport> {
        let hc = hc.map(|path| load(path.as_ref())).transpose()?;
        let hosp = hosp.map(|path| load(path.as_ref())).transpose()?;
        Ok(self.preview(hc.as_ref(), hosp.as_ref(), set))
    }
}

impl Default for Previewer {
    fn default() -> Self {
        Self::new()
    }
}

fn load(path: &Path) -> Result<Workbook> {
    read_workbook(path).with_context(|| format!("Failed to read workbook: {}", path.display()))
}

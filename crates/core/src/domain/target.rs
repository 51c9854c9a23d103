use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetName(pub String);

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One bank/document family the agent generates a parser for.
///
/// Locators are fixed once the run starts. The on-disk layout places each
/// target under its own directory: `{data_dir}/{name}/{name} sample.pdf` for
/// the sample statement and `{data_dir}/{name}/{name}_sample.csv` for the
/// ground-truth extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: TargetName,
    pub sample_pdf: PathBuf,
    pub expected_csv: PathBuf,
}

impl Target {
    pub fn from_data_dir(name: &str, data_dir: &Path) -> Self {
        let base = data_dir.join(name);
        Self {
            name: TargetName(name.to_string()),
            sample_pdf: base.join(format!("{name} sample.pdf")),
            expected_csv: base.join(format!("{name}_sample.csv")),
        }
    }

    /// Directory holding both locators, mounted read-only into the sandbox.
    pub fn data_dir(&self) -> &Path {
        self.sample_pdf.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn artifact_file_name(&self) -> String {
        format!("{}_parser.py", self.name.0)
    }
}

//! Frame output path patterns
//!
//! Accepts printf-style specifiers with exactly one integer placeholder, e.g.
//! `out/frame_%05d.png`. `%%` is a literal percent sign.

use crate::error::{PipelineError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPattern {
    source: String,
    prefix: String,
    suffix: String,
    zero_pad: bool,
    width: usize,
}

impl OutputPattern {
    /// Parse a specifier such as `frames/%06d.png`
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            PipelineError::invalid_config(format!("invalid output pattern '{pattern}': {reason}"))
        };

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut placeholder: Option<(bool, usize)> = None;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            let literal = if placeholder.is_some() {
                &mut suffix
            } else {
                &mut prefix
            };
            if c != '%' {
                literal.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                literal.push('%');
                continue;
            }
            if placeholder.is_some() {
                return Err(invalid("more than one placeholder"));
            }

            let zero_pad = chars.next_if_eq(&'0').is_some();
            let mut digits = String::new();
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                digits.push(d);
            }
            let width = if digits.is_empty() {
                0
            } else {
                digits.parse().map_err(|_| invalid("field width too large"))?
            };

            match chars.next() {
                Some('d' | 'u' | 'i') => placeholder = Some((zero_pad, width)),
                Some(other) => {
                    return Err(invalid(&format!("unsupported conversion '%{other}'")));
                },
                None => return Err(invalid("dangling '%'")),
            }
        }

        let (zero_pad, width) = placeholder.ok_or_else(|| invalid("no integer placeholder"))?;
        Ok(Self {
            source: pattern.to_string(),
            prefix,
            suffix,
            zero_pad,
            width,
        })
    }

    /// Path for frame `index`
    #[must_use]
    pub fn format(&self, index: u64) -> PathBuf {
        let number = if self.zero_pad {
            format!("{index:0width$}", width = self.width)
        } else {
            format!("{index:width$}", width = self.width)
        };
        PathBuf::from(format!("{}{}{}", self.prefix, number, self.suffix))
    }

    /// Directory every formatted path lands in, if any
    #[must_use]
    pub fn parent_dir(&self) -> Option<PathBuf> {
        self.format(0)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }
}

impl FromStr for OutputPattern {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OutputPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

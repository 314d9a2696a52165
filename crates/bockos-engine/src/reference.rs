//! Image reference parsing.

use std::fmt;

/// Repository and tag of an image, as the engine's import call wants them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Repository, including any registry host and port.
    pub repository: String,
    /// Tag.
    pub tag: String,
}

impl ImageRef {
    /// Default tag.
    pub const DEFAULT_TAG: &'static str = "latest";

    /// Split `repo[:tag]`.
    ///
    /// A colon followed by a `/` belongs to a registry port, not a tag:
    /// - `alpine` -> (alpine, latest)
    /// - `bockos/console:v0.1.0` -> (bockos/console, v0.1.0)
    /// - `registry:5000/os/console` -> (registry:5000/os/console, latest)
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        let reference = reference.trim();
        let reference = reference.split('@').next().unwrap_or(reference);

        match reference.rfind(':') {
            Some(idx) if !reference[idx + 1..].contains('/') => {
                let tag = &reference[idx + 1..];
                Self {
                    repository: reference[..idx].to_string(),
                    tag: if tag.is_empty() {
                        Self::DEFAULT_TAG.to_string()
                    } else {
                        tag.to_string()
                    },
                }
            }
            _ => Self {
                repository: reference.to_string(),
                tag: Self::DEFAULT_TAG.to_string(),
            },
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

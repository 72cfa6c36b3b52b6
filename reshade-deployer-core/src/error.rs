use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why an archive could not be turned into library files.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("archive does not contain {0}")]
    MissingEntry(String),
    #[error("no embedded zip archive found")]
    NoEmbeddedArchive,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures surfaced to the presentation layer. Helpers with a safe default never produce
/// one of these.
#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("failed to deploy {file} to {}", .path.display())]
    Deployment {
        file: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Vulkan system-wide deployment failed")]
    VulkanDeployment(#[source] io::Error),
    #[error("failed to download {url}")]
    Download {
        url: String,
        #[source]
        source: TransferError,
    },
    #[error("failed to extract {}", .archive.display())]
    Extraction {
        archive: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("self-update failed while trying to {stage}")]
    SelfUpdate {
        stage: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("unexpected response from {url}: {reason}")]
    UnexpectedResponse { url: String, reason: String },
}

impl DeployerError {
    pub(crate) fn deployment(file: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Deployment { file: file.into(), path: path.into(), source }
    }

    pub(crate) fn download(url: impl Into<String>, source: impl Into<TransferError>) -> Self {
        Self::Download { url: url.into(), source: source.into() }
    }

    pub(crate) fn extraction(archive: impl Into<PathBuf>, source: impl Into<ArchiveError>) -> Self {
        Self::Extraction { archive: archive.into(), source: source.into() }
    }

    /// Plain-language sentence for a message box.
    pub fn user_message(&self) -> String {
        match self {
            Self::Deployment { file, path, source } if source.kind() == io::ErrorKind::PermissionDenied => format!(
                "Could not create {file} in \"{}\". Creating symbolic links needs administrator rights or Windows Developer Mode.",
                path.display()
            ),
            Self::Deployment { file, path, .. } => {
                format!("Could not create {file} in \"{}\".", path.display())
            }
            Self::VulkanDeployment(_) => {
                "Vulkan system-wide installation failed. Try running the deployer as administrator.".to_string()
            }
            Self::Download { url, .. } => {
                format!("Could not download \"{url}\". The server may be down or the connection was blocked.")
            }
            Self::Extraction { .. } => {
                "The downloaded package could not be unpacked. Please report this to the developer.".to_string()
            }
            Self::SelfUpdate { stage, .. } => format!("The update failed while trying to {stage}."),
            Self::UnexpectedResponse { url, .. } => {
                format!("The server at \"{url}\" returned something unexpected. Please try again later.")
            }
        }
    }

    /// Full technical detail, one cause per line.
    pub fn details(&self) -> String {
        let mut text = self.to_string();
        let mut cause = self.source();
        while let Some(c) = cause {
            text.push_str("\n  caused by: ");
            text.push_str(&c.to_string());
            cause = c.source();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_walk_the_whole_source_chain() {
        let err = DeployerError::extraction("ReShade.exe", ArchiveError::MissingEntry("ReShade64.dll".into()));
        let details = err.details();
        assert!(details.starts_with("failed to extract ReShade.exe"));
        assert!(details.contains("caused by: archive does not contain ReShade64.dll"));
    }

    #[test]
    fn permission_errors_mention_symlink_privilege() {
        let err = DeployerError::deployment(
            "dxgi.dll",
            "C:/Games/Foo",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.user_message().contains("Developer Mode"));
    }
}

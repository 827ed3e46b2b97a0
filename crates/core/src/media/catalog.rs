use std::path::{Component, Path, PathBuf};

use crate::error::{Result, RtspError};
use crate::media::FrameStore;

/// Resolves SETUP resource names to frame store files under a media root.
///
/// Clients name a stream either by bare file name (`movie.Mjpeg`) or by
/// full URI (`rtsp://host:8554/movie.Mjpeg`). Both resolve to
/// `<root>/movie.Mjpeg`. Names that would leave the root resolve to nothing.
#[derive(Debug, Clone)]
pub struct MediaCatalog {
    root: PathBuf,
}

impl MediaCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a resource name onto a path inside the root.
    pub fn resolve(&self, resource: &str) -> Option<PathBuf> {
        let relative = Path::new(extract_resource_path(resource));

        let mut path = self.root.clone();
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return None;
                }
            }
        }

        (depth > 0).then_some(path)
    }

    /// Open the frame store behind a resource name.
    pub fn open(&self, resource: &str) -> Result<FrameStore> {
        let path = self
            .resolve(resource)
            .ok_or_else(|| RtspError::ResourceNotFound(resource.to_string()))?;
        FrameStore::open(path)
    }
}

impl Default for MediaCatalog {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Extract the resource path from a SETUP target.
///
/// `rtsp://host:8554/videos/movie.Mjpeg` → `videos/movie.Mjpeg`
/// `/movie.Mjpeg`                       → `movie.Mjpeg`
/// `movie.Mjpeg`                        → `movie.Mjpeg`
/// `rtsp://host:8554`                   → `` (nothing to open)
pub fn extract_resource_path(resource: &str) -> &str {
    let path = match resource
        .strip_prefix("rtsp://")
        .or_else(|| resource.strip_prefix("rtsps://"))
    {
        Some(after) => match after.find('/') {
            Some(slash) => &after[slash..],
            None => "",
        },
        None => resource,
    };

    path.trim_start_matches('/')
}

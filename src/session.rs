//! Selection state machine and per-image session
//!
//! One image is open at a time. Points accumulate one per click command
//! until the fourth computes the rectified raster; reset discards the
//! selection but keeps the image; save-and-advance writes the result and
//! opens the next unprocessed image. Commands are dispatched one at a
//! time from the interactive surface, so no step ever observes a
//! half-applied selection.

use crate::codec::{self, SaveError};
use crate::config::Config;
use crate::library::{ImageLibrary, LibraryError};
use crate::rectify::{self, GeometryError, Point};
use image::RgbaImage;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Where the user is in the four-point selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    /// No points yet
    Empty,
    /// One to three points
    Selecting,
    /// Four points and a computed rectified raster
    Ready,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no image loaded, the source folder is exhausted")]
    Exhausted,

    #[error("selection is not ready to save")]
    NotReady,

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// One loaded photo plus the points clicked on it
pub struct ImageSession {
    name: String,
    display: RgbaImage,
    points: Vec<Point>,
    rectified: Option<RgbaImage>,
}

impl ImageSession {
    fn new(name: String, display: RgbaImage) -> Self {
        Self {
            name,
            display,
            points: Vec::new(),
            rectified: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display(&self) -> &RgbaImage {
        &self.display
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn rectified(&self) -> Option<&RgbaImage> {
        self.rectified.as_ref()
    }

    pub fn state(&self) -> SelectionState {
        if self.rectified.is_some() {
            SelectionState::Ready
        } else if self.points.is_empty() {
            SelectionState::Empty
        } else {
            SelectionState::Selecting
        }
    }

    /// Accept one click. Clicks beyond the fourth are ignored. The fourth
    /// click computes the rectified raster synchronously; on a geometry
    /// failure the four points are kept visible so the user can reset.
    fn add_point(&mut self, point: Point) -> Result<SelectionState, GeometryError> {
        if self.points.len() >= 4 {
            tracing::debug!("ignoring click, selection already has four points");
            return Ok(self.state());
        }

        self.points.push(point);
        if self.points.len() == 4 {
            self.rectified = Some(rectify::rectify(&self.display, &self.points)?);
        }
        Ok(self.state())
    }

    /// Clear the selection but keep the loaded image
    fn reset(&mut self) {
        self.points.clear();
        self.rectified = None;
    }
}

/// Drives the tool: the open session, the work queue, and the
/// save-and-advance cycle.
pub struct SessionManager {
    library: ImageLibrary,
    session: Option<ImageSession>,
    /// Files that failed to decode this run, not offered again
    skipped: HashSet<String>,
}

impl SessionManager {
    /// Build the manager and open the first unprocessed image
    pub fn new(config: &Config) -> Result<Self, SessionError> {
        let library = ImageLibrary::new(
            config.source_folder.clone(),
            config.destination_folder.clone(),
        );
        let mut manager = Self {
            library,
            session: None,
            skipped: HashSet::new(),
        };
        manager.advance()?;
        Ok(manager)
    }

    pub fn current(&self) -> Option<&ImageSession> {
        self.session.as_ref()
    }

    /// Terminal state: every source image is processed (or unreadable)
    pub fn is_exhausted(&self) -> bool {
        self.session.is_none()
    }

    pub fn select_point(&mut self, point: Point) -> Result<SelectionState, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::Exhausted)?;
        Ok(session.add_point(point)?)
    }

    pub fn reset(&mut self) -> Result<SelectionState, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::Exhausted)?;
        session.reset();
        Ok(session.state())
    }

    /// Write the rectified raster to the destination folder and open the
    /// next unprocessed image. On a save failure the session stays ready
    /// so the user may retry.
    pub fn save_and_advance(&mut self) -> Result<PathBuf, SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::Exhausted)?;
        let rectified = session.rectified().ok_or(SessionError::NotReady)?;

        let path = codec::save_rectified(rectified, self.library.destination(), session.name())?;
        self.advance()?;
        Ok(path)
    }

    /// Open the next unprocessed image, skipping files that fail to
    /// decode. Leaves the manager exhausted when nothing is left.
    fn advance(&mut self) -> Result<(), SessionError> {
        self.session = None;
        for candidate in self.library.unprocessed()? {
            if self.skipped.contains(&candidate.name) {
                continue;
            }
            match codec::load_display(&candidate.path) {
                Ok(raster) => {
                    info!(
                        "Loaded {} ({}x{})",
                        candidate.name,
                        raster.width(),
                        raster.height()
                    );
                    self.session = Some(ImageSession::new(candidate.name, raster));
                    return Ok(());
                }
                Err(err) => {
                    warn!("Skipping {}: {}", candidate.name, err);
                    self.skipped.insert(candidate.name);
                }
            }
        }

        info!("Source folder exhausted, nothing left to rectify");
        Ok(())
    }
}

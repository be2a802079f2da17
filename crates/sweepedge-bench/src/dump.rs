//! Writes pipeline intermediates to a directory.
//!
//! Every plane is saved twice: stretched onto 0-255 as a PNG for viewing,
//! and as JSON holding the exact `f32` samples (non-finite values as
//! `"NaN"`, `"inf"`, `"-inf"`). The Sobel weights are saved as JSON.
//! Files are numbered in the order events arrive so a directory listing
//! reads as the pipeline order.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sweepedge_pipeline::{Kernel, Plane, StageEvent, StageObserver};

/// [`StageObserver`] that saves every event under `dir`.
///
/// Observers cannot fail, so write errors are collected and reported
/// by the caller after the run.
pub struct DumpObserver {
    dir: PathBuf,
    sequence: usize,
    written: usize,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct SobelWeights<'a> {
    sobel_x: &'a Kernel,
    sobel_y: &'a Kernel,
}

impl DumpObserver {
    /// Create the directory if needed and start numbering at zero.
    pub fn new(dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating dump directory {}: {e}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            sequence: 0,
            written: 0,
            errors: Vec::new(),
        })
    }

    /// Number of files written so far.
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Write errors, in the order they happened.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn path(&self, stem: &str, extension: &str) -> PathBuf {
        self.dir
            .join(format!("{:02}_{stem}.{extension}", self.sequence))
    }

    fn save_plane(&mut self, stem: &str, plane: &Plane) {
        let path = self.path(stem, "png");
        match plane.to_gray_image_normalized().save(&path) {
            Ok(()) => {
                log::debug!("dump: {}", path.display());
                self.written += 1;
            }
            Err(e) => self
                .errors
                .push(format!("Error writing {}: {e}", path.display())),
        }
        self.save_json(stem, plane);
    }

    fn save_weights(&mut self, sobel_x: &Kernel, sobel_y: &Kernel) {
        self.save_json("sobel_weights", &SobelWeights { sobel_x, sobel_y });
    }

    fn save_json<T: Serialize + ?Sized>(&mut self, stem: &str, value: &T) {
        let path = self.path(stem, "json");
        let result = serde_json::to_string(value)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&path, json).map_err(|e| e.to_string()));
        match result {
            Ok(()) => {
                log::debug!("dump: {}", path.display());
                self.written += 1;
            }
            Err(e) => self
                .errors
                .push(format!("Error writing {}: {e}", path.display())),
        }
    }
}

impl StageObserver for DumpObserver {
    fn observe(&mut self, event: StageEvent<'_>) {
        match event {
            StageEvent::SobelWeights { sobel_x, sobel_y } => self.save_weights(sobel_x, sobel_y),
            StageEvent::ChannelInput { channel, plane } => {
                self.save_plane(&format!("channel{channel}_input"), plane);
            }
            StageEvent::ChannelGradients {
                channel,
                grad_x,
                grad_y,
            } => {
                self.save_plane(&format!("channel{channel}_grad_x"), grad_x);
                self.save_plane(&format!("channel{channel}_grad_y"), grad_y);
            }
            StageEvent::Gradients { grad_x, grad_y, .. } => {
                self.save_plane("grad_x", grad_x);
                self.save_plane("grad_y", grad_y);
            }
            StageEvent::MagnitudeOrientation {
                magnitude,
                orientation,
            } => {
                self.save_plane("magnitude", magnitude);
                self.save_plane("orientation", orientation);
            }
            StageEvent::Thinned { thin } => self.save_plane("thin", thin),
            StageEvent::Classified { edges } => self.save_plane("edges", edges),
        }
        self.sequence += 1;
    }
}

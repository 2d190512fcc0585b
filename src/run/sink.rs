use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::foundation::core::{BatchIndex, Resolution, StepsRemaining};
use crate::foundation::error::{DiscoError, DiscoResult};

/// Configuration provided to a [`PreviewSink`] at the start of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewConfig {
    /// Preview frame size.
    pub resolution: Resolution,
    /// Images the run will generate.
    pub batch_size: usize,
    /// Reverse steps per image.
    pub steps: usize,
    /// Name prefix for exported files.
    pub batch_name: String,
}

/// Sink contract for consuming preview frames.
///
/// Ordering contract: within one batch index, `push_frame` is called with strictly decreasing
/// `StepsRemaining`; batch indices arrive in increasing order. `end` is called after the last
/// frame, also when the run was cancelled.
pub trait PreviewSink: Send {
    /// Called once before any frame is pushed.
    fn begin(&mut self, cfg: PreviewConfig) -> DiscoResult<()>;
    /// Push one preview frame.
    fn push_frame(
        &mut self,
        batch: BatchIndex,
        remaining: StepsRemaining,
        frame: &RgbImage,
    ) -> DiscoResult<()>;
    /// Called once after the last frame.
    fn end(&mut self) -> DiscoResult<()>;
}

/// One captured preview.
#[derive(Clone, Debug, PartialEq)]
pub struct PreviewFrame {
    /// Image the frame belongs to.
    pub batch: BatchIndex,
    /// Steps left when it was captured.
    pub steps_remaining: StepsRemaining,
    /// Frame pixels.
    pub image: RgbImage,
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<PreviewConfig>,
    frames: Vec<PreviewFrame>,
    ended: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<&PreviewConfig> {
        self.cfg.as_ref()
    }

    /// Borrow the captured frames in arrival order.
    pub fn frames(&self) -> &[PreviewFrame] {
        &self.frames
    }

    /// `true` once `end` was called.
    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl PreviewSink for InMemorySink {
    fn begin(&mut self, cfg: PreviewConfig) -> DiscoResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(
        &mut self,
        batch: BatchIndex,
        remaining: StepsRemaining,
        frame: &RgbImage,
    ) -> DiscoResult<()> {
        self.frames.push(PreviewFrame {
            batch,
            steps_remaining: remaining,
            image: frame.clone(),
        });
        Ok(())
    }

    fn end(&mut self) -> DiscoResult<()> {
        self.ended = true;
        Ok(())
    }
}

fn write_png(path: &Path, img: &RgbImage) -> DiscoResult<()> {
    image::save_buffer_with_format(
        path,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .map_err(|e| DiscoError::io(format!("write png '{}': {e}", path.display())))
}

fn create_dir(dir: &Path) -> DiscoResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| DiscoError::io(format!("create output dir '{}': {e}", dir.display())))
}

fn batch_name(cfg: Option<&PreviewConfig>) -> &str {
    match cfg {
        Some(c) if !c.batch_name.is_empty() => &c.batch_name,
        _ => "discoart",
    }
}

/// Writes every frame as `<name>-<batch>-<steps_remaining>.png` into a directory.
#[derive(Debug)]
pub struct PngFrameSink {
    dir: PathBuf,
    cfg: Option<PreviewConfig>,
    written: Vec<PathBuf>,
}

impl PngFrameSink {
    /// Sink writing into `dir` (created on `begin`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            written: Vec::new(),
        }
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl PreviewSink for PngFrameSink {
    fn begin(&mut self, cfg: PreviewConfig) -> DiscoResult<()> {
        create_dir(&self.dir)?;
        self.cfg = Some(cfg);
        self.written.clear();
        Ok(())
    }

    fn push_frame(
        &mut self,
        batch: BatchIndex,
        remaining: StepsRemaining,
        frame: &RgbImage,
    ) -> DiscoResult<()> {
        let name = batch_name(self.cfg.as_ref());
        let path = self
            .dir
            .join(format!("{name}-{}-{:04}.png", batch.0, remaining.0));
        write_png(&path, frame)?;
        self.written.push(path);
        Ok(())
    }

    fn end(&mut self) -> DiscoResult<()> {
        Ok(())
    }
}

/// Collects each image's progress frames into one grid, `<name>-progress-<batch>.png`, rewritten
/// on every captured frame so an interrupted run still leaves its latest sheet on disk.
///
/// Frames fill rows left to right in capture order; the grid is as close to square as the
/// frame count allows.
#[derive(Debug)]
pub struct SpriteSheetSink {
    dir: PathBuf,
    cfg: Option<PreviewConfig>,
    frames: BTreeMap<BatchIndex, Vec<RgbImage>>,
    written: Vec<PathBuf>,
}

impl SpriteSheetSink {
    /// Sink writing into `dir` (created on `begin`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            frames: BTreeMap::new(),
            written: Vec::new(),
        }
    }

    /// Sprite sheets on disk, one per image, in first-capture order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// Columns of a near-square grid holding `count` cells.
pub(crate) fn grid_columns(count: usize) -> usize {
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    cols
}

/// Tile equally sized frames into a near-square grid, row-major.
pub fn sprite_sheet(frames: &[RgbImage]) -> DiscoResult<RgbImage> {
    let Some(first) = frames.first() else {
        return Err(DiscoError::numerical("sprite sheet needs at least one frame"));
    };
    let (fw, fh) = first.dimensions();
    if frames.iter().any(|f| f.dimensions() != (fw, fh)) {
        return Err(DiscoError::numerical("sprite sheet frames differ in size"));
    }
    let cols = grid_columns(frames.len());
    let rows = frames.len().div_ceil(cols);
    let mut sheet = RgbImage::new(fw * cols as u32, fh * rows as u32);
    for (i, frame) in frames.iter().enumerate() {
        let (col, row) = ((i % cols) as i64, (i / cols) as i64);
        image::imageops::replace(&mut sheet, frame, col * i64::from(fw), row * i64::from(fh));
    }
    Ok(sheet)
}

impl PreviewSink for SpriteSheetSink {
    fn begin(&mut self, cfg: PreviewConfig) -> DiscoResult<()> {
        create_dir(&self.dir)?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.written.clear();
        Ok(())
    }

    fn push_frame(
        &mut self,
        batch: BatchIndex,
        _remaining: StepsRemaining,
        frame: &RgbImage,
    ) -> DiscoResult<()> {
        let frames = self.frames.entry(batch).or_default();
        frames.push(frame.clone());
        let sheet = sprite_sheet(frames)?;
        let name = batch_name(self.cfg.as_ref());
        let path = self.dir.join(format!("{name}-progress-{}.png", batch.0));
        write_png(&path, &sheet)?;
        tracing::debug!(path = %path.display(), frames = frames.len(), "updated progress sheet");
        if !self.written.contains(&path) {
            self.written.push(path);
        }
        Ok(())
    }

    fn end(&mut self) -> DiscoResult<()> {
        for (path, frames) in self.written.iter().zip(self.frames.values()) {
            tracing::info!(path = %path.display(), frames = frames.len(), "wrote progress sheet");
        }
        self.frames.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/run/sink.rs"]
mod tests;

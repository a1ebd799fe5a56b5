// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame sources available from the command line.

use std::fs;
use std::path::{Path, PathBuf};

use framecast::{PayloadSource, SourceError};

/// Synthetic grayscale frames: one luma byte per pixel, a horizontal
/// gradient with a bright vertical bar that moves one step per frame.
pub struct TestPatternSource {
    width: usize,
    height: usize,
    bar_x: usize,
}

const BAR_WIDTH: usize = 16;
const BAR_STEP: usize = 4;

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1) as usize,
            height: height.max(1) as usize,
            bar_x: 0,
        }
    }

    fn render(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.width * self.height);
        for _ in 0..self.height {
            frame.extend((0..self.width).map(|x| {
                if (self.bar_x..self.bar_x + BAR_WIDTH).contains(&x) {
                    0xFF
                } else {
                    (x * 200 / self.width) as u8
                }
            }));
        }
        frame
    }
}

impl PayloadSource for TestPatternSource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let frame = self.render();
        self.bar_x = (self.bar_x + BAR_STEP) % self.width;
        Ok(Some(frame))
    }
}

/// Streams pre-encoded frames (JPEG files, H.264 access units, ...) from a
/// directory, in file-name order, looping forever.
pub struct FileSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl FileSequenceSource {
    /// List the regular files in `dir`. Fails if there are none.
    pub fn open(dir: &Path) -> Result<Self, SourceError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        if files.is_empty() {
            return Err(SourceError::Other(format!(
                "no frame files in {}",
                dir.display()
            )));
        }
        files.sort();
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

impl PayloadSource for FileSequenceSource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        Ok(Some(fs::read(path)?))
    }
}

/// Source picked at startup.
pub enum FrameSource {
    Pattern(TestPatternSource),
    Files(FileSequenceSource),
}

impl FrameSource {
    pub fn describe(&self) -> String {
        match self {
            Self::Pattern(p) => format!("test pattern {}x{}", p.width, p.height),
            Self::Files(f) => format!("{} file(s), looping", f.len()),
        }
    }
}

impl PayloadSource for FrameSource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self {
            Self::Pattern(source) => source.next_payload(),
            Self::Files(source) => source.next_payload(),
        }
    }
}

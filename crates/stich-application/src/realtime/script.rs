//! The scripted generation run.
//!
//! No real generation backend is wired in; a run walks a fixed sequence of
//! phases and emits a fixed set of synthetic files.

use std::time::Duration;

use stich_core::config::GenerationSettings;
use stich_core::generation::{GeneratedFile, GenerationStatus};

pub const ANALYZING_PROGRESS: u8 = 10;
pub const GENERATING_PROGRESS: u8 = 30;
pub const PROGRESS_PER_FILE: u8 = 20;
pub const REVIEWING_PROGRESS: u8 = 80;
pub const COMPLETED_PROGRESS: u8 = 100;

/// A fixed phase of the run, before and after the per-file steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub status: GenerationStatus,
    pub progress: u8,
    pub label: &'static str,
}

pub const ANALYZING: Phase = Phase {
    status: GenerationStatus::Analyzing,
    progress: ANALYZING_PROGRESS,
    label: "Analyzing requirements...",
};

pub const GENERATING: Phase = Phase {
    status: GenerationStatus::Generating,
    progress: GENERATING_PROGRESS,
    label: "Generating application structure...",
};

pub const REVIEWING: Phase = Phase {
    status: GenerationStatus::Reviewing,
    progress: REVIEWING_PROGRESS,
    label: "Reviewing generated code...",
};

/// Timing and output of a scripted run.
#[derive(Debug, Clone)]
pub struct GenerationScript {
    pub phase_delay: Duration,
    pub file_delay: Duration,
    pub files: Vec<GeneratedFile>,
}

impl GenerationScript {
    pub fn new(phase_delay: Duration, file_delay: Duration, files: Vec<GeneratedFile>) -> Self {
        Self {
            phase_delay,
            file_delay,
            files,
        }
    }

    pub fn from_settings(settings: &GenerationSettings) -> Self {
        Self::new(settings.phase_delay(), settings.file_delay(), default_files())
    }

    /// Progress reported once the file at `index` has been produced.
    ///
    /// Stays below the reviewing mark however many files there are.
    pub fn file_progress(index: usize) -> u8 {
        let step = (index as u64 + 1) * u64::from(PROGRESS_PER_FILE);
        let progress = u64::from(GENERATING_PROGRESS) + step;
        progress.min(u64::from(REVIEWING_PROGRESS - 1)) as u8
    }
}

impl Default for GenerationScript {
    fn default() -> Self {
        Self::from_settings(&GenerationSettings::default())
    }
}

/// The synthetic scaffold every run produces.
pub fn default_files() -> Vec<GeneratedFile> {
    vec![
        GeneratedFile::new(
            "package.json",
            "/package.json",
            r#"{
  "name": "generated-app",
  "version": "1.0.0",
  "private": true,
  "scripts": {
    "dev": "vite",
    "build": "vite build"
  },
  "dependencies": {
    "react": "^18.2.0",
    "react-dom": "^18.2.0"
  },
  "devDependencies": {
    "vite": "^5.0.0"
  }
}
"#,
            "json",
        ),
        GeneratedFile::new(
            "index.html",
            "/index.html",
            r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Generated App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#,
            "html",
        ),
    ]
}

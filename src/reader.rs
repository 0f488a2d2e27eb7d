//! Trajectory corpus reader.
//!
//! The corpus is one UTF-8 text file per taxi, each line
//! `taxi_id,YYYY-MM-DD HH:MM:SS,lon,lat` (the timestamp field may be quoted,
//! and may also be a raw epoch integer). Lines that do not split into exactly
//! four comma fields, or whose numeric conversions fail, are skipped without
//! an error.
//!
//! Naive timestamps are interpreted as UTC on every parse and format path.

use chrono::NaiveDateTime;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{Result, TaxitraceError};
use taxitrace_types::{TaxiTrack, TrackPoint};

const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse one corpus line into a sample. Returns `None` for malformed lines.
pub fn parse_line(line: &str) -> Option<TrackPoint> {
    let mut fields = line.split(',');
    let taxi_id = fields.next()?.trim();
    let time = fields.next()?.trim().trim_matches('"');
    let lon = fields.next()?.trim();
    let lat = fields.next()?.trim();
    if fields.next().is_some() {
        return None;
    }

    let taxi_id: u64 = taxi_id.parse().ok()?;
    let timestamp = parse_line_timestamp(time)?;
    let lon: f64 = lon.parse().ok()?;
    let lat: f64 = lat.parse().ok()?;

    Some(TrackPoint::new(taxi_id, timestamp, lon, lat))
}

/// Timestamps in track files are either epoch seconds or naive local-format
/// datetimes (treated as UTC).
fn parse_line_timestamp(field: &str) -> Option<f64> {
    if let Ok(epoch) = field.parse::<i64>() {
        return Some(epoch as f64);
    }
    NaiveDateTime::parse_from_str(field, LINE_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp() as f64)
}

/// A directory of per-taxi track files.
#[derive(Debug, Clone)]
pub struct TrackDir {
    dir: PathBuf,
}

impl TrackDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Iterate over the corpus, yielding one track per file.
    ///
    /// Files are visited in name order so that repeated runs enumerate the
    /// corpus identically. Tracks are yielded one at a time; nothing is
    /// buffered across files.
    pub fn tracks(&self) -> Result<TrackIter> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();
        Ok(TrackIter {
            files: files.into_iter(),
            skipped_lines: 0,
        })
    }

    /// Re-read one taxi's file, keeping only samples inside `[t_lo, t_hi]`
    /// (inclusive), sorted by time.
    pub fn read_track_window(&self, taxi_id: u64, t_lo: f64, t_hi: f64) -> Result<Vec<TrackPoint>> {
        let path = self.dir.join(format!("{taxi_id}.txt"));
        if !path.is_file() {
            return Err(TaxitraceError::Internal(format!(
                "track file for taxi {taxi_id} not found under {}",
                self.dir.display()
            )));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut points: Vec<TrackPoint> = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if let Some(point) = parse_line(&line) {
                if t_lo <= point.timestamp && point.timestamp <= t_hi {
                    points.push(point);
                }
            }
        }
        points.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(points)
    }
}

/// Iterator over the tracks of a [`TrackDir`].
pub struct TrackIter {
    files: std::vec::IntoIter<PathBuf>,
    skipped_lines: u64,
}

impl TrackIter {
    /// Malformed lines skipped so far across all files visited.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    fn read_file(&mut self, path: &Path) -> Result<TaxiTrack> {
        let stem_id: Option<u64> = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok());

        let reader = BufReader::new(File::open(path)?);
        let mut track = TaxiTrack::new(stem_id.unwrap_or(0));
        let mut skipped = 0u64;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(point) => {
                    if stem_id.is_none() && track.is_empty() {
                        track.taxi_id = point.taxi_id;
                    }
                    track.points.push(point);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("skipped {skipped} malformed lines in {}", path.display());
        }
        self.skipped_lines += skipped;
        Ok(track)
    }
}

impl Iterator for TrackIter {
    type Item = Result<TaxiTrack>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        Some(self.read_file(&path))
    }
}

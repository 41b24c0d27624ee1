//! Time-bucketed partition layout of a bucket.

use std::fmt;
use std::str::FromStr;

use batchline_common::{Error, HierarchyLevel, Prefix};
use chrono::{NaiveDate, NaiveDateTime};

/// One level of the partition hierarchy.
///
/// With a `width`, only segments made of exactly that many ASCII digits
/// count as partitions at this level. Fixed-width, zero-padded segments are
/// what make lexicographic order agree with chronological order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLevel {
    pub name: String,
    pub width: Option<usize>,
}

impl PartitionLevel {
    pub fn new(name: impl Into<String>, width: Option<usize>) -> Self {
        Self { name: name.into(), width }
    }

    pub fn accepts(&self, segment: &str) -> bool {
        match self.width {
            Some(width) => segment.len() == width && segment.bytes().all(|b| b.is_ascii_digit()),
            None => !segment.is_empty(),
        }
    }
}

/// The ordered levels a batch lookup descends through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionScheme {
    levels: Vec<PartitionLevel>,
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self {
            levels: vec![
                PartitionLevel::new("year", Some(4)),
                PartitionLevel::new("month", Some(2)),
                PartitionLevel::new("day", Some(2)),
                PartitionLevel::new("hour", Some(2)),
            ],
        }
    }
}

impl PartitionScheme {
    pub fn new(levels: Vec<PartitionLevel>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[PartitionLevel] {
        &self.levels
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn hierarchy_level(&self, index: usize) -> HierarchyLevel {
        HierarchyLevel {
            depth: index + 1,
            name: self.levels[index].name.clone(),
        }
    }
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, level) in self.levels.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            match level.width {
                Some(width) => write!(f, "{}:{}", level.name, width)?,
                None => f.write_str(&level.name)?,
            }
        }
        Ok(())
    }
}

/// Parses `year:4,month:2,day:2,hour:2`; a level without `:width` accepts
/// any segment.
impl FromStr for PartitionScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| Error::ConfigInvalid {
            key: "PARTITION_LEVELS".to_string(),
            reason,
        };

        let mut levels = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let level = match part.split_once(':') {
                Some((name, width)) => {
                    let width: usize = width
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("width of level '{name}' is not a number")))?;
                    if width == 0 {
                        return Err(invalid(format!("width of level '{name}' must be positive")));
                    }
                    PartitionLevel::new(name.trim(), Some(width))
                }
                None => PartitionLevel::new(part, None),
            };
            levels.push(level);
        }
        if levels.is_empty() {
            return Err(invalid("at least one level is required".to_string()));
        }
        Ok(Self { levels })
    }
}

/// The deepest partition found by a batch lookup.
///
/// Recomputed on every lookup, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLocation {
    bucket: String,
    prefix: Prefix,
    path: Vec<Prefix>,
    scheme: PartitionScheme,
}

impl BatchLocation {
    /// `path` holds the prefix chosen at each level, shallowest first.
    /// `prefix` is the last of them, or the base prefix for a scheme
    /// without levels.
    pub(crate) fn new(bucket: &str, prefix: Prefix, path: Vec<Prefix>, scheme: PartitionScheme) -> Self {
        Self {
            bucket: bucket.to_string(),
            prefix,
            path,
            scheme,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The fully resolved prefix, e.g. `raw/2024/01/15/09/`.
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn path(&self) -> &[Prefix] {
        &self.path
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    /// `(level name, segment)` pairs along the path.
    pub fn segments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.scheme
            .levels()
            .iter()
            .zip(self.path.iter())
            .map(|(level, prefix)| (level.name.as_str(), prefix.last_segment()))
    }

    /// Start of the batch's time bucket, when the levels are named
    /// `year`, `month`, `day` and optionally `hour`.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        let mut year = None;
        let mut month = None;
        let mut day = None;
        let mut hour = 0;
        for (name, segment) in self.segments() {
            let value: u32 = segment.parse().ok()?;
            match name {
                "year" => year = Some(i32::try_from(value).ok()?),
                "month" => month = Some(value),
                "day" => day = Some(value),
                "hour" => hour = value,
                _ => return None,
            }
        }
        NaiveDate::from_ymd_opt(year?, month?, day?)?.and_hms_opt(hour, 0, 0)
    }
}

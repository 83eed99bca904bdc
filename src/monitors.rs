//! Monitor layout and the topology key derived from it.
//!
//! Provides a `Monitors` list that is sorted on construction so the same
//! physical arrangement always yields the same [`TopologyKey`], no matter in
//! which order the platform enumerated the displays.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::types::Point;
use crate::types::Rect;

/// Information about a single monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    /// Index in the sorted monitor list.
    pub index:       usize,
    /// Platform device name (e.g. `\\.\DISPLAY1`).
    pub device_name: String,
    /// Full monitor rectangle in virtual-screen coordinates.
    pub bounds:      Rect,
    pub primary:     bool,
}

impl MonitorInfo {
    #[must_use]
    pub fn new(device_name: impl Into<String>, bounds: Rect, primary: bool) -> Self {
        Self {
            index: 0,
            device_name: device_name.into(),
            bounds,
            primary,
        }
    }

    fn contains(&self, point: Point) -> bool {
        point.x >= self.bounds.left
            && point.x < self.bounds.right()
            && point.y >= self.bounds.top
            && point.y < self.bounds.bottom()
    }

    fn key_segment(&self) -> String {
        format!(
            "[Display:{} Loc:{}x{} Res:{}x{}]",
            self.device_name,
            self.bounds.left,
            self.bounds.top,
            self.bounds.width,
            self.bounds.height
        )
    }
}

/// Deterministic identifier of a monitor arrangement.
///
/// Any change in monitor count, position or resolution produces a different
/// key; two reads of an unchanged arrangement produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopologyKey(String);

impl TopologyKey {
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TopologyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for TopologyKey {
    fn from(value: &str) -> Self { Self(value.to_string()) }
}

/// Sorted monitor list.
///
/// Monitors are sorted by device name, then by position and resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Monitors {
    list: Vec<MonitorInfo>,
}

impl Monitors {
    /// Build a sorted list, reassigning each monitor's `index`.
    #[must_use]
    pub fn new(mut list: Vec<MonitorInfo>) -> Self {
        list.sort_by(|a, b| {
            (
                &a.device_name,
                a.bounds.left,
                a.bounds.top,
                a.bounds.width,
                a.bounds.height,
            )
                .cmp(&(
                    &b.device_name,
                    b.bounds.left,
                    b.bounds.top,
                    b.bounds.width,
                    b.bounds.height,
                ))
        });
        for (idx, monitor) in list.iter_mut().enumerate() {
            monitor.index = idx;
        }
        Self { list }
    }

    #[must_use]
    pub fn len(&self) -> usize { self.list.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.list.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorInfo> { self.list.iter() }

    /// Find monitor containing position (x, y).
    #[must_use]
    pub fn at(&self, x: i32, y: i32) -> Option<&MonitorInfo> {
        self.list.iter().find(|mon| mon.contains(Point::new(x, y)))
    }

    /// The primary monitor, or the first one when none is flagged primary.
    #[must_use]
    pub fn primary(&self) -> Option<&MonitorInfo> {
        self.list
            .iter()
            .find(|mon| mon.primary)
            .or_else(|| self.list.first())
    }

    /// Find the monitor at position, or the closest one if outside all bounds.
    ///
    /// Unlike [`at`](Self::at), this returns a monitor whenever the list is
    /// non-empty by picking the closest monitor when the position is outside
    /// all bounds.
    #[must_use]
    pub fn closest_to(&self, x: i32, y: i32) -> Option<&MonitorInfo> {
        // Try exact match first
        if let Some(monitor) = self.at(x, y) {
            return Some(monitor);
        }

        // Find closest monitor by distance to bounding box
        self.list.iter().min_by_key(|mon| {
            let right = mon.bounds.right();
            let bottom = mon.bounds.bottom();

            let dx = if x < mon.bounds.left {
                mon.bounds.left - x
            } else if x >= right {
                x - right + 1
            } else {
                0
            };

            let dy = if y < mon.bounds.top {
                mon.bounds.top - y
            } else if y >= bottom {
                y - bottom + 1
            } else {
                0
            };

            i64::from(dx) * i64::from(dx) + i64::from(dy) * i64::from(dy)
        })
    }

    /// Serialize the arrangement into its topology key.
    #[must_use]
    pub fn topology_key(&self) -> TopologyKey {
        let segments: Vec<String> = self.list.iter().map(MonitorInfo::key_segment).collect();
        TopologyKey(segments.join(","))
    }
}

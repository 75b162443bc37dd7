//! Fatal-failure detection on inbound relay output.
//!
//! The relay has no error channel. When the backend cannot log in or start
//! a shell it writes a human-readable message into the normal output stream
//! and drops the shell, sometimes leaving the WebSocket open. The only way
//! to notice is to look for known substrings.
//!
//! Everything that depends on that heuristic goes through [`FatalMarkers`],
//! so a structured error channel can replace it without touching the
//! session state machine.
//!
//! Each inbound frame is matched on its own: the relay writes every failure
//! message in a single frame, so a marker is never split across frames.

use crate::constants::FATAL_MARKERS;

/// A relay failure recognised in the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// The marker that matched.
    pub marker: String,
    /// The full frame, lossily decoded, as shown to the operator.
    pub text: String,
}

/// The set of substrings that mark a frame as fatal.
#[derive(Debug, Clone)]
pub struct FatalMarkers {
    markers: Vec<String>,
}

impl Default for FatalMarkers {
    fn default() -> Self {
        Self {
            markers: FATAL_MARKERS.iter().map(|m| (*m).to_string()).collect(),
        }
    }
}

impl FatalMarkers {
    /// Built-in markers plus `extra`. Blank entries are ignored.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut markers = Self::default();
        for marker in extra {
            let marker = marker.into();
            if !marker.trim().is_empty() && !markers.markers.contains(&marker) {
                markers.markers.push(marker);
            }
        }
        markers
    }

    /// Markers in match order.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Classify one inbound frame. `None` means ordinary screen output.
    pub fn classify(&self, payload: &[u8]) -> Option<RelayFailure> {
        let marker = self
            .markers
            .iter()
            .find(|marker| contains(payload, marker.as_bytes()))?;

        Some(RelayFailure {
            marker: marker.clone(),
            text: String::from_utf8_lossy(payload).into_owned(),
        })
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

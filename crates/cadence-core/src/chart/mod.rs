//! Chart model
//!
//! A chart is a section table followed by a note table, both sorted by time.
//!
//! # Binary layout
//!
//! ```text
//! offset 0   u16 LE   byte offset of the note table
//! offset 2   section records (4 bytes each) up to the note table
//!            u16 LE end step (exclusive), u8 flags, u8 pad
//! note table note records (4 bytes each) up to end of file
//!            u16 LE position (1/24 step), u8 type, u8 pad
//!            the last record is the 0xFFFF sentinel
//! ```
//!
//! Note type byte: bits 0-1 lane, bit 2 opponent, bit 3 sustain body,
//! bit 4 sustain tail, bit 7 runtime hit flag (cleared on load).

use bitflags::bitflags;
use thiserror::Error;

use crate::types::NUM_LANES;

/// Note position units per step
pub const POS_UNITS_PER_STEP: i32 = 24;

/// Position value of the end-of-chart sentinel note
pub const NOTE_SENTINEL: u16 = 0xFFFF;

const HEADER_LEN: usize = 2;
const SECTION_RECORD_LEN: usize = 4;
const NOTE_RECORD_LEN: usize = 4;
const LANE_MASK: u8 = 0x3;

bitflags! {
    /// Per-section presentation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectionFlags: u8 {
        /// Camera focuses the opponent during this section
        const OPPONENT_FOCUS = 1 << 0;
        /// Opponent uses alternate animations
        const ALT_ANIM = 1 << 1;
    }
}

bitflags! {
    /// Note type flags (the lane lives in the low two bits of the same byte)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NoteFlags: u8 {
        const OPPONENT = 1 << 2;
        const SUSTAIN = 1 << 3;
        const SUSTAIN_END = 1 << 4;
        const HIT = 1 << 7;
    }
}

/// Chart layout errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChartError {
    #[error("Chart too short: {len} bytes")]
    TooShort { len: usize },

    #[error("Note table offset {offset} out of range for {len} byte chart")]
    BadNoteOffset { offset: usize, len: usize },

    #[error("{table} table length {len} is not a multiple of the record size")]
    Misaligned { table: &'static str, len: usize },

    #[error("Chart has no sections")]
    NoSections,

    #[error("Section {index} ends before the previous section")]
    SectionOrder { index: usize },

    #[error("Note {index} is earlier than the previous note")]
    NoteOrder { index: usize },

    #[error("Note {index} has invalid lane {lane}")]
    BadLane { index: usize, lane: u8 },

    #[error("Note {index} uses the reserved sentinel position")]
    ReservedPosition { index: usize },

    #[error("Note table is missing the end-of-chart sentinel")]
    MissingSentinel,

    #[error("{extra} bytes of data after the end-of-chart sentinel")]
    TrailingData { extra: usize },
}

/// A run of notes sharing camera focus and animation style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// Exclusive end boundary in steps
    pub end: u16,
    pub flags: SectionFlags,
}

impl Section {
    pub fn new(end: u16, flags: SectionFlags) -> Self {
        Self { end, flags }
    }

    pub fn opponent_focus(&self) -> bool {
        self.flags.contains(SectionFlags::OPPONENT_FOCUS)
    }

    pub fn alt_anim(&self) -> bool {
        self.flags.contains(SectionFlags::ALT_ANIM)
    }
}

/// A single timed input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Position in 1/24 step units
    pub pos: u16,
    /// Lane 0-3
    pub lane: u8,
    pub flags: NoteFlags,
}

impl Note {
    pub fn new(pos: u16, lane: u8, flags: NoteFlags) -> Self {
        Self { pos, lane, flags }
    }

    /// Decode a note type byte
    pub fn from_type_byte(pos: u16, type_byte: u8) -> Self {
        Self {
            pos,
            lane: type_byte & LANE_MASK,
            flags: NoteFlags::from_bits_truncate(type_byte) - NoteFlags::HIT,
        }
    }

    /// Encode the type byte (the runtime hit flag is never written)
    pub fn type_byte(&self) -> u8 {
        (self.lane & LANE_MASK) | (self.flags - NoteFlags::HIT).bits()
    }

    #[inline]
    pub fn is_opponent(&self) -> bool {
        self.flags.contains(NoteFlags::OPPONENT)
    }

    #[inline]
    pub fn is_sustain(&self) -> bool {
        self.flags.contains(NoteFlags::SUSTAIN)
    }

    #[inline]
    pub fn is_sustain_end(&self) -> bool {
        self.flags.contains(NoteFlags::SUSTAIN_END)
    }

    #[inline]
    pub fn is_hit(&self) -> bool {
        self.flags.contains(NoteFlags::HIT)
    }
}

/// Parsed chart: section table and note table
///
/// The layout is immutable after load; only per-note hit flags change
/// during a session. The sentinel is not stored in `notes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    sections: Vec<Section>,
    notes: Vec<Note>,
}

impl Chart {
    /// Build a chart from tables, validating ordering
    pub fn new(sections: Vec<Section>, notes: Vec<Note>) -> Result<Self, ChartError> {
        if sections.is_empty() {
            return Err(ChartError::NoSections);
        }
        for (index, pair) in sections.windows(2).enumerate() {
            if pair[1].end < pair[0].end {
                return Err(ChartError::SectionOrder { index: index + 1 });
            }
        }
        for (index, note) in notes.iter().enumerate() {
            if note.pos == NOTE_SENTINEL {
                return Err(ChartError::ReservedPosition { index });
            }
            if note.lane as usize >= NUM_LANES {
                return Err(ChartError::BadLane { index, lane: note.lane });
            }
            if index > 0 && note.pos < notes[index - 1].pos {
                return Err(ChartError::NoteOrder { index });
            }
        }
        let notes = notes
            .into_iter()
            .map(|mut n| {
                n.flags.remove(NoteFlags::HIT);
                n
            })
            .collect();
        Ok(Self { sections, notes })
    }

    /// Parse the binary chart layout
    pub fn parse(data: &[u8]) -> Result<Self, ChartError> {
        if data.len() < HEADER_LEN {
            return Err(ChartError::TooShort { len: data.len() });
        }
        let note_offset = u16::from_le_bytes([data[0], data[1]]) as usize;
        if note_offset < HEADER_LEN || note_offset > data.len() {
            return Err(ChartError::BadNoteOffset {
                offset: note_offset,
                len: data.len(),
            });
        }

        let section_bytes = &data[HEADER_LEN..note_offset];
        if section_bytes.len() % SECTION_RECORD_LEN != 0 {
            return Err(ChartError::Misaligned {
                table: "Section",
                len: section_bytes.len(),
            });
        }
        let note_bytes = &data[note_offset..];
        if note_bytes.len() % NOTE_RECORD_LEN != 0 {
            return Err(ChartError::Misaligned {
                table: "Note",
                len: note_bytes.len(),
            });
        }

        let sections: Vec<Section> = section_bytes
            .chunks_exact(SECTION_RECORD_LEN)
            .map(|rec| {
                Section::new(
                    u16::from_le_bytes([rec[0], rec[1]]),
                    SectionFlags::from_bits_truncate(rec[2]),
                )
            })
            .collect();

        let mut notes = Vec::with_capacity(note_bytes.len() / NOTE_RECORD_LEN);
        let mut sentinel_at = None;
        for (index, rec) in note_bytes.chunks_exact(NOTE_RECORD_LEN).enumerate() {
            let pos = u16::from_le_bytes([rec[0], rec[1]]);
            if pos == NOTE_SENTINEL {
                sentinel_at = Some(index);
                break;
            }
            notes.push(Note::from_type_byte(pos, rec[2]));
        }

        let sentinel_at = sentinel_at.ok_or(ChartError::MissingSentinel)?;
        let consumed = (sentinel_at + 1) * NOTE_RECORD_LEN;
        if consumed < note_bytes.len() {
            return Err(ChartError::TrailingData {
                extra: note_bytes.len() - consumed,
            });
        }

        let chart = Self::new(sections, notes)?;
        log::debug!(
            "Parsed chart: {} sections, {} notes",
            chart.sections.len(),
            chart.notes.len()
        );
        Ok(chart)
    }

    /// Serialize back to the binary layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let note_offset = HEADER_LEN + self.sections.len() * SECTION_RECORD_LEN;
        let mut out =
            Vec::with_capacity(note_offset + (self.notes.len() + 1) * NOTE_RECORD_LEN);
        out.extend_from_slice(&(note_offset as u16).to_le_bytes());
        for section in &self.sections {
            out.extend_from_slice(&section.end.to_le_bytes());
            out.push(section.flags.bits());
            out.push(0);
        }
        for note in &self.notes {
            out.extend_from_slice(&note.pos.to_le_bytes());
            out.push(note.type_byte());
            out.push(0);
        }
        out.extend_from_slice(&NOTE_SENTINEL.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, index: usize) -> Option<&Note> {
        self.notes.get(index)
    }

    /// Set the runtime hit flag on a note
    pub fn mark_hit(&mut self, index: usize) {
        if let Some(note) = self.notes.get_mut(index) {
            note.flags.insert(NoteFlags::HIT);
        }
    }

    /// Clear every runtime hit flag (restart the stage)
    pub fn reset_hits(&mut self) {
        for note in &mut self.notes {
            note.flags.remove(NoteFlags::HIT);
        }
    }

    /// Step at which the last section ends
    pub fn end_step(&self) -> u16 {
        self.sections.last().map(|s| s.end).unwrap_or(0)
    }
}

// MIDI import and export for phrases.
//
// Export writes a single-track Standard MIDI File (format 0) at 480 ticks
// per quarter note: tempo and time signature meta events, a piano program
// change, then one note-on/note-off pair per sounding run. Rests are just
// gaps between events. A measure is a whole note, so one slot lasts
// `4 * 480 / subdivision` ticks.
//
// Import reads every track of a metrical file, pairs note-ons with their
// note-offs, and quantizes onsets and releases to the nearest slot. The
// melody is then rebuilt monophonically:
// - the first note at an onset slot wins; later notes on that slot are
//   dropped,
// - a note is cut short at the next kept onset,
// - gaps are filled with rests, split at measure boundaries,
// - notes starting past the end of the phrase are dropped with a warning,
// - pitches outside the playable range are reflected into it.
//
// Uses the `midly` crate for both directions.

use crate::config::{MAX_TEMPO_BPM, MIN_TEMPO_BPM, Meter};
use crate::error::GaError;
use crate::phrase::{MAX_PITCH, MIN_PITCH, Phrase, PhraseDims, REST, reflect_pitch};
use log::{debug, warn};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use rustc_hash::FxHashMap;
use std::path::Path;

/// Ticks per quarter note in exported files.
pub const TICKS_PER_QUARTER: u16 = 480;

const CHANNEL: u8 = 0;
const VELOCITY: u8 = 80;
/// General MIDI acoustic grand piano.
const PIANO: u8 = 0;

fn ticks_per_slot(dims: PhraseDims) -> u32 {
    u32::from(TICKS_PER_QUARTER) * 4 / dims.subdivision
}

/// Convert a phrase to MIDI and write it to a file.
pub fn write_midi(phrase: &Phrase, meter: &Meter, path: &Path) -> Result<(), GaError> {
    let smf = phrase_to_smf(phrase, meter);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Convert a phrase to an in-memory SMF.
pub fn phrase_to_smf(phrase: &Phrase, meter: &Meter) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));
    let channel = u4::new(CHANNEL);
    let mut track: Track<'static> = Vec::new();

    let bpm = meter.tempo_bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
    let tempo_microseconds = 60_000_000 / u32::from(bpm);
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            PhraseDims::BEATS_PER_MEASURE as u8,
            2,
            24,
            8,
        )),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Phrase")),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(PIANO),
            },
        },
    });

    let slot_ticks = ticks_per_slot(phrase.dims());
    let mut last_event_tick: u32 = 0;
    for run in phrase.sounding_runs() {
        let on_tick = run.slot as u32 * slot_ticks;
        let off_tick = run.end() as u32 * slot_ticks;
        track.push(TrackEvent {
            delta: u28::new(on_tick - last_event_tick),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: u7::new(run.pitch),
                    vel: u7::new(VELOCITY),
                },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(off_tick - on_tick),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key: u7::new(run.pitch),
                    vel: u7::new(0),
                },
            },
        });
        last_event_tick = off_tick;
    }

    // End of track sits at the phrase end so trailing rests survive.
    let end_tick = phrase.dims().slot_count() as u32 * slot_ticks;
    track.push(TrackEvent {
        delta: u28::new(end_tick - last_event_tick),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);
    smf
}

/// A note recovered from a MIDI file, in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TickNote {
    start: u64,
    end: u64,
    key: u8,
    /// Position of the note-on in file order.
    order: usize,
}

/// What an import kept and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub notes_kept: usize,
    /// Notes sharing an onset slot with an earlier note.
    pub notes_merged: usize,
    /// Notes starting at or after the phrase end.
    pub notes_dropped: usize,
}

/// Read a MIDI file into `phrase`, replacing its melody.
pub fn read_midi(path: &Path, phrase: &mut Phrase) -> Result<ImportReport, GaError> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes).map_err(|e| GaError::Midi(e.to_string()))?;
    load_smf(&smf, phrase)
}

/// Quantize the notes of a parsed SMF into `phrase`.
pub fn load_smf(smf: &Smf<'_>, phrase: &mut Phrase) -> Result<ImportReport, GaError> {
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => u64::from(tpq.as_int()),
        Timing::Timecode(..) => {
            return Err(GaError::Midi("timecode-based files are not supported".into()));
        }
    };
    if ticks_per_quarter == 0 {
        return Err(GaError::Midi("file declares zero ticks per quarter note".into()));
    }

    let mut notes = collect_notes(smf);
    notes.sort_by_key(|n| (n.start, n.order));

    let dims = phrase.dims();
    let total = dims.slot_count();
    let measure_len = dims.measure_len();
    let ticks_per_measure = ticks_per_quarter * 4;
    let subdivision = u64::from(dims.subdivision);
    let to_slot =
        |tick: u64| ((tick * subdivision + ticks_per_measure / 2) / ticks_per_measure) as usize;

    // Keep the first note per onset slot.
    let mut onsets: Vec<(usize, usize, u8)> = Vec::with_capacity(notes.len());
    let mut report = ImportReport::default();
    for note in &notes {
        let start = to_slot(note.start);
        if start >= total {
            report.notes_dropped += 1;
            continue;
        }
        if onsets.last().is_some_and(|&(s, _, _)| s == start) {
            report.notes_merged += 1;
            continue;
        }
        let end = to_slot(note.end).max(start + 1).min(total);
        onsets.push((start, end, note.key));
    }
    if report.notes_dropped > 0 {
        warn!(
            "dropped {} notes past the end of a {}-measure phrase",
            report.notes_dropped, dims.num_measures
        );
    }

    let mut pitches = vec![REST; total];
    let mut rhythm = vec![0u16; total];
    let mut cursor = 0;
    for (i, &(start, end, key)) in onsets.iter().enumerate() {
        let end = onsets.get(i + 1).map_or(end, |next| end.min(next.0));
        fill_rests(&mut pitches, &mut rhythm, cursor, start, measure_len);
        pitches[start] = if (MIN_PITCH..=MAX_PITCH).contains(&key) {
            key
        } else {
            reflect_pitch(i32::from(key))
        };
        rhythm[start] = (end - start) as u16;
        cursor = end;
        report.notes_kept += 1;
    }
    fill_rests(&mut pitches, &mut rhythm, cursor, total, measure_len);

    phrase.load_melody(&pitches, &rhythm)?;
    debug!(
        "imported {} notes ({} merged, {} dropped)",
        report.notes_kept, report.notes_merged, report.notes_dropped
    );
    Ok(report)
}

/// Write rest runs over `[from, to)`, one per measure fragment.
fn fill_rests(pitches: &mut [u8], rhythm: &mut [u16], from: usize, to: usize, measure_len: usize) {
    let mut slot = from;
    while slot < to {
        let measure_end = (slot / measure_len + 1) * measure_len;
        let end = measure_end.min(to);
        pitches[slot] = REST;
        rhythm[slot] = (end - slot) as u16;
        slot = end;
    }
}

/// Pair note-ons with note-offs across all tracks. Notes still held when a
/// track ends are closed at the track's last tick.
fn collect_notes(smf: &Smf<'_>) -> Vec<TickNote> {
    let mut notes = Vec::new();
    let mut order = 0;
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        let mut held: FxHashMap<(u8, u8), (u64, usize)> = FxHashMap::default();
        for event in track {
            tick += u64::from(event.delta.as_int());
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    held.entry((channel, key.as_int())).or_insert((tick, order));
                    order += 1;
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some((start, order)) = held.remove(&(channel, key.as_int())) {
                        notes.push(TickNote {
                            start,
                            end: tick,
                            key: key.as_int(),
                            order,
                        });
                    }
                }
                _ => {}
            }
        }
        for ((_, key), (start, order)) in held {
            notes.push(TickNote {
                start,
                end: tick,
                key,
                order,
            });
        }
    }
    notes
}

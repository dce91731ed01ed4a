// Harmonic vocabulary: scale-degree chords in C major.
//
// Every phrase carries one chord per beat (a "chord block" is a quarter of a
// measure). Chords are described by a Roman numeral and a quality; the
// numeral fixes the root as a diatonic degree of C major counted up from
// middle C, and the quality picks the third and fifth above that root.
//
// The chord-fitness extractor (`fitness/extract.rs`) measures each sounding
// note against the root of the chord under it, so the only operation the
// rest of the crate really needs is `Chord::root_below`, which folds the root
// into the octave at or below a given pitch.

/// MIDI number of middle C, the reference octave for chord roots.
pub const MIDDLE_C: u8 = 60;

/// Diatonic scale degree of a chord root in C major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChordNumeral {
    I,
    II,
    III,
    IV,
    V,
    VI,
    VII,
}

impl ChordNumeral {
    /// Semitones from the tonic to this degree of the major scale.
    pub fn semitones(self) -> u8 {
        match self {
            ChordNumeral::I => 0,
            ChordNumeral::II => 2,
            ChordNumeral::III => 4,
            ChordNumeral::IV => 5,
            ChordNumeral::V => 7,
            ChordNumeral::VI => 9,
            ChordNumeral::VII => 11,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChordNumeral::I => "I",
            ChordNumeral::II => "II",
            ChordNumeral::III => "III",
            ChordNumeral::IV => "IV",
            ChordNumeral::V => "V",
            ChordNumeral::VI => "VI",
            ChordNumeral::VII => "VII",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChordQuality {
    #[default]
    Major,
    Minor,
    Augmented,
    Diminished,
}

/// A chord: root degree plus quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub numeral: ChordNumeral,
    pub quality: ChordQuality,
}

impl Default for Chord {
    fn default() -> Self {
        Chord::major(ChordNumeral::I)
    }
}

impl Chord {
    pub fn major(numeral: ChordNumeral) -> Self {
        Chord {
            numeral,
            quality: ChordQuality::Major,
        }
    }

    /// Root pitch in the middle-C octave (60..=71).
    pub fn root(self) -> u8 {
        MIDDLE_C + self.numeral.semitones()
    }

    /// Root transposed by octaves to the highest copy that is `<= pitch`.
    ///
    /// The result satisfies `pitch - root_below(pitch)` in `0..12`. Pitches
    /// lower than the lowest representable root clamp to that root's pitch
    /// class in octave zero.
    pub fn root_below(self, pitch: u8) -> u8 {
        let class = self.numeral.semitones();
        if pitch < class {
            return class;
        }
        pitch - (pitch - class) % 12
    }

    /// Triad pitches (root, third, fifth) in the middle-C octave.
    pub fn tones(self) -> [u8; 3] {
        let root = self.root();
        let (third, fifth) = match self.quality {
            ChordQuality::Major => (4, 7),
            ChordQuality::Minor => (3, 7),
            ChordQuality::Augmented => (4, 8),
            ChordQuality::Diminished => (3, 6),
        };
        [root, root + third, root + fifth]
    }

    pub fn label(self) -> String {
        let suffix = match self.quality {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Augmented => "+",
            ChordQuality::Diminished => "o",
        };
        format!("{}{}", self.numeral.label(), suffix)
    }
}

/// The template progression laid over every measure of a new phrase.
pub const TEMPLATE_PROGRESSION: [ChordNumeral; 4] = [
    ChordNumeral::I,
    ChordNumeral::IV,
    ChordNumeral::V,
    ChordNumeral::I,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_sit_in_middle_octave() {
        assert_eq!(Chord::major(ChordNumeral::I).root(), 60);
        assert_eq!(Chord::major(ChordNumeral::IV).root(), 65);
        assert_eq!(Chord::major(ChordNumeral::V).root(), 67);
        assert_eq!(Chord::major(ChordNumeral::VII).root(), 71);
    }

    #[test]
    fn root_below_folds_into_one_octave() {
        let five = Chord::major(ChordNumeral::V);
        for pitch in 21..=108u8 {
            let root = five.root_below(pitch);
            assert!(root <= pitch);
            assert!(pitch - root < 12, "pitch {pitch} root {root}");
            assert_eq!(root % 12, 7);
        }
        assert_eq!(five.root_below(67), 67);
        assert_eq!(five.root_below(66), 55);
    }

    #[test]
    fn triad_qualities() {
        let two = Chord {
            numeral: ChordNumeral::II,
            quality: ChordQuality::Minor,
        };
        assert_eq!(two.tones(), [62, 65, 69]);
        let seven = Chord {
            numeral: ChordNumeral::VII,
            quality: ChordQuality::Diminished,
        };
        assert_eq!(seven.tones(), [71, 74, 77]);
        assert_eq!(seven.label(), "VIIo");
    }
}

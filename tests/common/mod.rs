//! Builds small binary LM dumps for the integration tests.

#![allow(dead_code)]

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use noload_ngram::{Endian, LanguageModelConfig};
use std::io::Write;
use tempfile::NamedTempFile;

/// Linear unigram probabilities of [`Fixture::standard`], sentence start excluded.
pub const STANDARD_LINEAR: [(&str, f64); 5] = [
    ("</s>", 0.1),
    ("The", 0.3),
    ("cat", 0.2),
    ("sat", 0.2),
    ("mat", 0.2),
];

#[derive(Debug, Clone)]
pub struct TrigramFixture {
    pub records: Vec<(u16, u16)>,
    pub backoff: Vec<f32>,
    pub probabilities: Vec<f32>,
    /// `None` writes the size the loader expects.
    pub segments: Option<Vec<i32>>,
}

/// Description of a dump; `bytes` serialises it in the requested order.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub version: i32,
    pub log2_segment_size: Option<i32>,
    pub source_name: String,
    pub words: Vec<String>,
    /// `(log10 probability, log10 backoff)` per word.
    pub unigrams: Vec<(f32, f32)>,
    /// `(second word id, probability index)` per first word.
    pub followers: Vec<Vec<(u16, u16)>>,
    pub bigram_probabilities: Vec<f32>,
    pub trigram: Option<TrigramFixture>,
    /// Replaces the generated NUL-separated word blob.
    pub word_blob: Option<Vec<u8>>,
    /// Replaces the leading header length field.
    pub magic: Option<[u8; 4]>,
}

impl Fixture {
    /// Six words, six bigrams, two trigrams, versioned header with segment size 2.
    ///
    /// | id | word | followers            |
    /// |----|------|----------------------|
    /// | 0  | <s>  | The (0), cat (1)     |
    /// | 1  | </s> |                      |
    /// | 2  | The  | cat (2), mat (3)     |
    /// | 3  | cat  | sat (4)              |
    /// | 4  | sat  |                      |
    /// | 5  | mat  | </s> (0)             |
    pub fn standard() -> Self {
        let mut unigrams = vec![(-99.0f32, -0.25f32)];
        let backoffs = [0.0f32, -0.3, -0.2, -0.1, -0.15];
        for ((_, linear), backoff) in STANDARD_LINEAR.iter().zip(backoffs) {
            unigrams.push((linear.log10() as f32, backoff));
        }

        Self {
            version: -2,
            log2_segment_size: Some(1),
            source_name: "tiny.arpa".to_string(),
            words: ["<s>", "</s>", "The", "cat", "sat", "mat"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            unigrams,
            followers: vec![
                vec![(2, 0), (3, 1)],
                vec![],
                vec![(3, 2), (5, 3)],
                vec![(4, 4)],
                vec![],
                vec![(1, 0)],
            ],
            bigram_probabilities: vec![-0.2, -0.5, -0.1, -0.4, -0.05],
            trigram: Some(TrigramFixture {
                records: vec![(3, 0), (5, 1)],
                backoff: vec![-0.3],
                probabilities: vec![-0.15, -0.6],
                segments: None,
            }),
            word_blob: None,
            magic: None,
        }
    }

    pub fn number_bigrams(&self) -> usize {
        self.followers.iter().map(Vec::len).sum()
    }

    pub fn bytes(&self, order: Endian) -> Vec<u8> {
        let mut out = DumpWriter {
            order,
            out: Vec::new(),
        };
        let number_bigrams = self.number_bigrams();
        let number_trigrams = self.trigram.as_ref().map_or(0, |t| t.records.len());

        match self.magic {
            Some(magic) => out.raw(&magic),
            None => out.i32(17),
        }
        out.raw(b"Darpa Trigram LM\0");
        out.i32(self.source_name.len() as i32 + 1);
        out.raw(self.source_name.as_bytes());
        out.raw(&[0]);

        out.i32(self.version);
        if self.version <= 0 {
            out.i32(1_700_000_000);
            let description = b"test fixture";
            out.i32(description.len() as i32);
            out.raw(description);
            out.i32(0);
            if self.version <= -2 {
                out.i32(self.log2_segment_size.unwrap_or(9));
            }
            out.i32(self.words.len() as i32);
        }
        out.i32(number_bigrams as i32);
        out.i32(number_trigrams as i32);

        let mut first_bigram = 0;
        for (id, (probability, backoff)) in self.unigrams.iter().enumerate() {
            out.i32(id as i32);
            out.f32(*probability);
            out.f32(*backoff);
            out.i32(first_bigram);
            first_bigram += self.followers.get(id).map_or(0, Vec::len) as i32;
        }

        if number_bigrams > 0 {
            for (word, probability) in self.followers.iter().flatten() {
                out.bigram_record(*word, *probability);
            }
            out.bigram_record(0xFFFF, 0);
        }
        if let Some(trigram) = &self.trigram {
            for (word, probability) in &trigram.records {
                out.u16(*word);
                out.u16(*probability);
            }
        }

        if number_bigrams > 0 {
            out.f32_table(&self.bigram_probabilities);
        }
        if let Some(trigram) = &self.trigram {
            out.f32_table(&trigram.backoff);
            out.f32_table(&trigram.probabilities);
            let segment_size = 1usize << self.log2_segment_size.unwrap_or(9);
            let segments = trigram
                .segments
                .clone()
                .unwrap_or_else(|| (0..(number_bigrams + 1) / segment_size + 1).map(|i| i as i32).collect());
            out.i32(segments.len() as i32);
            for segment in segments {
                out.i32(segment);
            }
        }

        let blob = self.word_blob.clone().unwrap_or_else(|| {
            let mut blob = Vec::new();
            for word in &self.words {
                blob.extend_from_slice(word.as_bytes());
                blob.push(0);
            }
            blob
        });
        out.i32(blob.len() as i32);
        out.raw(&blob);
        out.out
    }

    /// Writes the dump to a temporary file that lives as long as the handle.
    pub fn write(&self, order: Endian) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.bytes(order)).unwrap();
        file.flush().unwrap();
        file
    }
}

pub fn config_for(file: &NamedTempFile) -> LanguageModelConfig {
    LanguageModelConfig::for_location(file.path())
}

struct DumpWriter {
    order: Endian,
    out: Vec<u8>,
}

impl DumpWriter {
    fn raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    fn i32(&mut self, value: i32) {
        match self.order {
            Endian::Big => self.out.write_i32::<BigEndian>(value),
            Endian::Little => self.out.write_i32::<LittleEndian>(value),
        }
        .unwrap();
    }

    fn u16(&mut self, value: u16) {
        match self.order {
            Endian::Big => self.out.write_u16::<BigEndian>(value),
            Endian::Little => self.out.write_u16::<LittleEndian>(value),
        }
        .unwrap();
    }

    fn f32(&mut self, value: f32) {
        match self.order {
            Endian::Big => self.out.write_f32::<BigEndian>(value),
            Endian::Little => self.out.write_f32::<LittleEndian>(value),
        }
        .unwrap();
    }

    fn f32_table(&mut self, values: &[f32]) {
        self.i32(values.len() as i32);
        for &value in values {
            self.f32(value);
        }
    }

    fn bigram_record(&mut self, word: u16, probability: u16) {
        self.u16(word);
        self.u16(probability);
        self.u16(0);
        self.u16(0);
    }
}

//! Shared fixtures: a naive index writer for small references.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rawmap::index::files;
use rawmap::index::{AnnFile, BwtFile, Contig, IndexMeta, SaFile};
use rawmap::util::dna;

/// A fixture index held alongside the text it was built from.
pub struct Fixture {
    pub prefix: PathBuf,
    /// Encoded text, sentinel last.
    pub text: Vec<u8>,
    pub sa: Vec<u64>,
    pub contigs: Vec<Contig>,
}

/// Full suffix array of `text` with the sentinel sorting first.
pub fn naive_sa(text: &[u8]) -> Vec<u64> {
    let key = |c: u8| if c == dna::SENTINEL { 0 } else { c + 1 };
    let mut sa: Vec<usize> = (0..text.len()).collect();
    sa.sort_by(|&a, &b| text[a..].iter().map(|&c| key(c)).cmp(text[b..].iter().map(|&c| key(c))));
    sa.into_iter().map(|p| p as u64).collect()
}

pub fn naive_bwt(text: &[u8], sa: &[u64]) -> Vec<u8> {
    let n = text.len();
    sa.iter().map(|&p| text[(p as usize + n - 1) % n]).collect()
}

/// Concatenate `contigs`, separated by `gap` spacer bases that belong to no
/// contig, and write the index triple under `dir/name`.
pub fn write_index(dir: &Path, name: &str, contigs: &[(&str, &[u8])], gap: &[u8], sa_interval: u64) -> Fixture {
    let mut seq = Vec::new();
    let mut ann = Vec::new();
    for (i, (cname, cseq)) in contigs.iter().enumerate() {
        if i > 0 {
            seq.extend_from_slice(gap);
        }
        ann.push(Contig { name: cname.to_string(), offset: seq.len() as u64, len: cseq.len() as u64 });
        seq.extend_from_slice(cseq);
    }
    let mut text = dna::encode_seq(&seq).expect("fixture reference is ACGT");
    text.push(dna::SENTINEL);
    let sa = naive_sa(&text);
    let bwt = naive_bwt(&text, &sa);

    let prefix = dir.join(name);
    files::write_all(
        &prefix,
        &BwtFile::new(bwt),
        &SaFile::from_full(&sa, sa_interval),
        &AnnFile::new(ann.clone(), IndexMeta { reference_file: Some(format!("{}.fa", name)), built_at: None }),
    )
    .expect("write fixture index");
    Fixture { prefix, text, sa, contigs: ann }
}

/// Slots whose suffix starts with `pattern`, by brute force over the full SA.
pub fn brute_force_range(fx: &Fixture, pattern: &[u8]) -> Vec<u64> {
    (0..fx.sa.len() as u64)
        .filter(|&slot| {
            let p = fx.sa[slot as usize] as usize;
            fx.text[p..].starts_with(pattern)
        })
        .collect()
}

/// Complete k-mer table with levels rising linearly in id.
pub fn model_table(k: u8) -> String {
    let count = 1u32 << (2 * k);
    let mut out = String::from("kmer\tlevel_mean\tlevel_stdv\tsd_mean\tsd_stdv\tig_lambda\n");
    for id in 0..count {
        let kmer: String = (0..k).map(|i| dna::from_code(((id >> (2 * (k - 1 - i))) & 3) as u8) as char).collect();
        let level = 60.0 + 60.0 * id as f64 / count as f64;
        out.push_str(&format!("{}\t{:.4}\t1.5\t1.2\t0.3\t7.0\n", kmer, level));
    }
    out
}

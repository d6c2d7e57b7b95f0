use std::io::BufRead;
use std::iter::{Map, Rev};
use std::slice;

use anyhow::Result;

use super::KmerModel;
use crate::io::fasta::FastaReader;
use crate::util::dna;

/// 基于碱基编码流的滚动 k-mer 编码器（`None` 表示非 ACGT）。
///
/// 遇到非 ACGT 碱基时窗口重新开始，输出的 k-mer 不会跨越它。
#[derive(Debug, Clone)]
pub struct KmerIter<I> {
    codes: I,
    k: u8,
    mask: u32,
    id: u32,
    filled: u8,
}

type CodeFn = fn(&u8) -> Option<u8>;

pub type ForwardKmers<'a> = KmerIter<Map<slice::Iter<'a, u8>, CodeFn>>;
pub type ReverseKmers<'a> = KmerIter<Map<Rev<slice::Iter<'a, u8>>, CodeFn>>;

fn forward_code(b: &u8) -> Option<u8> {
    dna::to_code(*b)
}

fn reverse_code(b: &u8) -> Option<u8> {
    dna::to_code(*b).map(dna::complement_code)
}

impl<I> KmerIter<I> {
    fn new(codes: I, k: u8) -> Self {
        let mask = if k >= 16 { u32::MAX } else { (1u32 << (2 * k as u32)) - 1 };
        Self { codes, k, mask, id: 0, filled: 0 }
    }
}

impl<I: Iterator<Item = Option<u8>>> Iterator for KmerIter<I> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        for code in self.codes.by_ref() {
            match code {
                Some(c) => {
                    self.id = ((self.id << 2) | c as u32) & self.mask;
                    if self.filled < self.k {
                        self.filled += 1;
                    }
                    if self.filled == self.k {
                        return Some(self.id as u16);
                    }
                }
                None => {
                    self.id = 0;
                    self.filled = 0;
                }
            }
        }
        None
    }
}

impl KmerModel {
    /// 惰性生成 `seq` 及其反向互补序列的 k-mer id。
    /// 反向迭代器直接倒序遍历 `seq`，不额外分配。
    pub fn encode_reference<'a>(&self, seq: &'a [u8]) -> (ForwardKmers<'a>, ReverseKmers<'a>) {
        let k = self.kmer_len();
        let fwd = KmerIter::new(seq.iter().map(forward_code as CodeFn), k);
        let rev = KmerIter::new(seq.iter().rev().map(reverse_code as CodeFn), k);
        (fwd, rev)
    }

    /// 编码 FASTA 流中的全部记录。各记录独立编码（k-mer 不跨记录），
    /// id 按记录顺序追加。
    pub fn encode_fasta<R: BufRead>(&self, reader: R) -> Result<(Vec<u16>, Vec<u16>)> {
        let mut fasta = FastaReader::new(reader);
        let mut fwd_ids = Vec::new();
        let mut rev_ids = Vec::new();
        while let Some(rec) = fasta.next_record()? {
            let (fwd, rev) = self.encode_reference(&rec.seq);
            fwd_ids.extend(fwd);
            rev_ids.extend(rev);
        }
        Ok((fwd_ids, rev_ids))
    }
}

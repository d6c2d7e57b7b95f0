/// 碱基数（A, C, G, T）
pub const BASES: usize = 4;
/// 哨兵编码，字典序最小，但不参与碱基计数
pub const SENTINEL: u8 = 4;

/// ASCII 碱基 -> 2-bit 编码 {A:0, C:1, G:2, T/U:3}；其他字符返回 None。
#[inline]
pub fn to_code(b: u8) -> Option<u8> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn from_code(code: u8) -> u8 {
    match code {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        SENTINEL => b'$',
        _ => b'N',
    }
}

/// 编码层面的互补：A<->T, C<->G
#[inline]
pub fn complement_code(code: u8) -> u8 {
    3 - (code & 3)
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// 将 ASCII 序列编码为 2-bit 编码；遇到非 ACGT 字符返回其位置。
pub fn encode_seq(seq: &[u8]) -> Result<Vec<u8>, usize> {
    seq.iter()
        .enumerate()
        .map(|(i, &b)| to_code(b).ok_or(i))
        .collect()
}

use anyhow::{bail, Result};
use std::io::BufRead;

/// 参考序列记录：序列保持原样大写，非 ACGT 字符留给下游处理。
#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub seq: Vec<u8>,
}

/// 按字节读取的 FASTA 解析器；容忍 CRLF、空行以及序列行内的空白。
pub struct FastaReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    pending_id: Option<String>,
    line_no: usize,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::new(), pending_id: None, line_no: 0 }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self.reader.read_until(b'\n', &mut self.line)?;
        self.line_no += 1;
        Ok(n > 0)
    }

    fn header_id(&self) -> String {
        let header = &self.line[1..];
        let end = header.iter().position(u8::is_ascii_whitespace).unwrap_or(header.len());
        String::from_utf8_lossy(&header[..end]).into_owned()
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        let id = match self.pending_id.take() {
            Some(id) => id,
            None => loop {
                if !self.read_line()? {
                    return Ok(None);
                }
                match self.line.first() {
                    Some(b'>') => break self.header_id(),
                    Some(b) if !b.is_ascii_whitespace() => {
                        bail!("line {}: sequence data before first FASTA header", self.line_no)
                    }
                    _ => {}
                }
            },
        };

        let mut seq = Vec::new();
        while self.read_line()? {
            if self.line.first() == Some(&b'>') {
                self.pending_id = Some(self.header_id());
                break;
            }
            seq.extend(self.line.iter().filter(|b| !b.is_ascii_whitespace()).map(u8::to_ascii_uppercase));
        }
        Ok(Some(FastaRecord { id, seq }))
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

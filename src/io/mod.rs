pub mod fasta;
pub mod signal;

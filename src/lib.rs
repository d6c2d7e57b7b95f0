//! # rawmap
//!
//! 纳米孔原始电流信号实时比对（Read Until）的核心组件。
//!
//! 本 crate 不负责决策算法本身，而是提供比对器所依赖的三块基础设施：
//!
//! - **FM 索引查询**：加载预构建的 BWT / 采样后缀数组 / contig 注释，
//!   支持单碱基反向扩展、SA 位置还原与 contig 坐标换算
//! - **k-mer 信号模型**：每个 k-mer 的高斯电流参数、事件打分、停留概率、
//!   信号归一化与参考序列 k-mer 编码
//! - **比对线程池**：有界输入队列 + 阻塞式 worker，按批补充、非阻塞收集结果
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use rawmap::index::FmIndex;
//! use rawmap::model::KmerModel;
//! use rawmap::util::dna;
//!
//! let index = FmIndex::load("ref.fa")?;
//! let model = KmerModel::load("r9.4_450bps.model", false)?;
//!
//! // 精确匹配：逐碱基反向扩展
//! let pattern = dna::encode_seq(b"GCTGATC").map_err(|i| anyhow::anyhow!("bad base at {}", i))?;
//! let range = index.backward_search(&pattern);
//! for pos in index.interval_positions(range)? {
//!     if let Some(loc) = index.translate_position(pos) {
//!         println!("{}:{}", loc.name, loc.offset);
//!     }
//! }
//!
//! let id = model.kmer_to_id(b"ACGTAC", 0)?;
//! println!("{} -> {}", model.id_to_kmer(id), id);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## 模块说明
//!
//! - [`index`]：FM 索引文件格式与查询
//! - [`model`]：k-mer 模型、事件、归一化、参考编码
//! - [`align`]：比对器接口与比对结果
//! - [`pool`]：比对线程池
//! - [`io`]：FASTA 解析与原始信号源接口
//! - [`util`]：DNA 编码 / 反向互补等工具函数

pub mod align;
pub mod index;
pub mod io;
pub mod model;
pub mod pool;
pub mod util;

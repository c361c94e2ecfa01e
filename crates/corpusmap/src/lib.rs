#![forbid(unsafe_code)]

//! Corpus browsing on top of [`kdspace`] and [`unispring`].
//!
//! A [`Corpus`] holds descriptor vectors tagged with caller payloads (sound grains, file
//! offsets, anything). It can be searched by example through a [`CorpusIndex`] and spread
//! over a 2D or 3D region for display through [`Corpus::layout`].
//!
//! ```
//! use corpusmap::{BuildOptions, Corpus};
//!
//! let mut corpus = Corpus::new(2)?;
//! corpus.push(&[0.0, 0.0], "kick")?;
//! corpus.push(&[0.1, 0.9], "snare")?;
//! corpus.push(&[0.8, 0.2], "hat")?;
//!
//! let mut index = corpus.index(&BuildOptions::default())?;
//! assert_eq!(*index.nearest(&[0.7, 0.3])?.payload, "hat");
//!
//! let layout = corpus.layout_request(r#"{"shape": {"type": "disk", "center": [0, 0], "radius": 1}}"#)?;
//! assert_eq!(layout.len(), 3);
//! # Ok::<(), corpusmap::Error>(())
//! ```
//!
//! # Features
//!
//! - `parallel`: compute layout forces on the rayon thread pool

pub mod corpus;
pub mod error;

pub use corpus::{Corpus, CorpusIndex, CorpusLayout, Hit, LayoutRequest, Placed};
pub use error::{Error, Result};

pub use kdspace::{self, BuildOptions, Metric, SplitRule};
pub use unispring::{self, LayoutResult, Shape, ShapeSpec, SpringConfig, Termination};

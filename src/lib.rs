//! twenty48: exact solver for 2048 on small boards
//!
//! The game is solved as a Markov decision process. States are grouped into
//! layers by tile sum, which grows by 2 or 4 every move, so the reachable
//! space can be enumerated forwards one layer at a time and then solved
//! backwards from the largest layer down.
//!
//! This crate provides:
//! - A packed `State` type with slide/merge tables and symmetry reduction (`engine`)
//! - Terminal resolvers that detect states won or lost within a few moves (`resolver`)
//! - The layer builder, compactor and solver working over vbyte-compressed
//!   layer files (`builder`, `compactor`, `solver`, `serialization`, `layers`)
//! - A simulator that plays out solved policies (`simulator`)
//!
//! Quick start:
//! ```
//! use twenty48::builder::LayerBuilder;
//! use twenty48::config::{BuilderConfig, ModelConfig, SimulatorConfig, SolverConfig};
//! use twenty48::layers::LayerFolder;
//! use twenty48::resolver::ExactResolver;
//! use twenty48::simulator::Simulator;
//! use twenty48::solver::LayerSolver;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let model = ModelConfig::new(2, 4, 0).unwrap();
//! let resolver = ExactResolver::<2>::new(model).unwrap();
//!
//! let folder = LayerFolder::new(dir.path());
//! let builder = LayerBuilder::new(folder.clone(), &resolver, BuilderConfig::default()).unwrap();
//! builder.build_start_state_layers().unwrap();
//! builder.build().unwrap();
//!
//! let solution = LayerSolver::new(folder, &resolver, SolverConfig::default()).unwrap().solve().unwrap();
//! let report = Simulator::new(&solution, &resolver, SimulatorConfig { batch_size: 50, ..Default::default() })
//!     .run()
//!     .unwrap();
//! assert_eq!(report.games, 50);
//! ```
//!
pub mod builder;
pub mod cache;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod layers;
pub mod pool;
pub mod resolver;
pub mod serialization;
pub mod simulator;
pub mod solver;

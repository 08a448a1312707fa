//! # dylive-rs
//!
//! This crate resolves Douyin live rooms to playable stream URLs. It reads the
//! public web pages the platform serves (live pages, reflow pages, category
//! listings) and the mobile profile API, and turns share messages copied out
//! of the app into user and room ids.
//!
//! ## Usage
//!
//! Everything goes through [`live::Api`]. The following example resolves a
//! share message to a room and prints its HD FLV stream.
//!
//! ```rust,no_run
//! use dylive_rs::{config::Config, live::Api, share::Input, stream::StreamFormat};
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = Api::new(Config::default()).unwrap();
//!
//!     let input = Input::parse("#在抖音，记录美好生活# https://v.douyin.com/e9oSECC/");
//!     let mut room = api.get_room_for_input(&input).await.unwrap();
//!
//!     if !room.is_operating() {
//!         println!("Room is not live");
//!         return;
//!     }
//!
//!     // Rooms taken from listings may come without a stream manifest
//!     api.ensure_stream(&mut room).await.unwrap();
//!     println!("{}", room.url_for(StreamFormat::Flv, "hd"));
//! }
//! ```
//!
//! The page decoders in [`page`] are pure functions over the fetched HTML and
//! can be used without the network.

#[forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod config;
pub mod live;
pub mod model;
pub mod page;
pub mod payload;
pub mod share;
pub mod stream;
pub mod util;

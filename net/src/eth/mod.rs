// SPDX-License-Identifier: Apache-2.0

//! Ethernet layer types.

pub mod mac;

pub use mac::Mac;

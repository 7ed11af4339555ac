//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod collections;
pub mod debug;
pub mod discovery;
pub mod error;
pub mod events;
pub mod instance;
pub mod interface;
pub mod label_table;
pub mod management;
pub mod network;
pub mod packet;
pub mod peer;
pub mod route;
pub mod tasks;

pub use instance::{InstanceCfg, InstanceHandle, spawn};

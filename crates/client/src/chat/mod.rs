// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct-message chat: message normalization, per-peer conversation
//! threads with durable client-side persistence, and the router that
//! ties them to the realtime connection.

pub mod message;
pub mod router;
pub mod store;

pub use message::ChatMessage;
pub use router::DmRouter;
pub use store::ThreadStore;

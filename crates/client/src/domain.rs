// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin typed clients for the domain resources: song queue, leaderboard,
//! archive search, wishlist, voting, profile. Plain request/response
//! over the authorized HTTP layer — no local state.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::transport::http::ApiClient;

// -- Resource types -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRequest {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub requested_by: u64,
    #[serde(default)]
    pub position: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSongRequest {
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: u64,
    pub username: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub id: u64,
    pub title: String,
    pub artist: String,
    /// Epoch milliseconds.
    pub performed_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub id: u64,
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub performance_id: u64,
    pub score: u8,
}

// -- Resource calls -----------------------------------------------------------

impl ApiClient {
    pub async fn song_queue(&self) -> Result<Vec<SongRequest>, ApiError> {
        self.get_json("/songs/queue").await
    }

    pub async fn request_song(&self, req: &NewSongRequest) -> Result<SongRequest, ApiError> {
        self.post_json("/songs/queue", req).await
    }

    pub async fn cancel_request(&self, id: u64) -> Result<(), ApiError> {
        self.delete(&format!("/songs/queue/{id}")).await
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, ApiError> {
        self.get_json("/leaderboard").await
    }

    pub async fn search_archive(&self, query: &str) -> Result<Vec<ArchiveEntry>, ApiError> {
        self.get_query_json("/archive", &[("q", query)]).await
    }

    pub async fn wishlist(&self) -> Result<Vec<WishlistItem>, ApiError> {
        self.get_json("/wishlist").await
    }

    pub async fn add_wish(&self, req: &NewSongRequest) -> Result<WishlistItem, ApiError> {
        self.post_json("/wishlist", req).await
    }

    pub async fn remove_wish(&self, id: u64) -> Result<(), ApiError> {
        self.delete(&format!("/wishlist/{id}")).await
    }

    pub async fn vote(&self, vote: &Vote) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json("/votes", vote).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        self.get_json("/users/me").await
    }
}

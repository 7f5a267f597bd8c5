// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod billing;
pub mod credential;
pub mod location;
pub mod notification;
pub mod review;
pub mod user;

pub use billing::{Plan, PlanLimits, Subscription, UsageCounter};
pub use credential::{Credential, Provider};
pub use location::{Location, LocationSource};
pub use notification::{
    Notification, NotificationChannels, NotificationPreferences, NotificationReason,
};
pub use review::{Reply, ReplySource, Review, SyncResult};
pub use user::User;

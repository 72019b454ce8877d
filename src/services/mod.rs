// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - release polling engine and its upstream clients.

pub mod pager;
pub mod player;
pub mod poll;
pub mod releases;
pub mod scheduler;
pub mod spotify;
pub mod telegram;
pub mod token;

pub use pager::{Page, PagedReader};
pub use player::{Player, SpotifyPlayer};
pub use poll::{PollRun, PollSettings, SweepReport, SweepRunner, WindowStart};
pub use releases::select_new;
pub use scheduler::{PollScheduler, SchedulerHandle, SchedulerSettings, TriggerOutcome};
pub use spotify::{Catalog, SpotifyAuth, SpotifyCatalog};
pub use telegram::{NotificationDispatcher, TelegramNotifier};
pub use token::{TokenLifecycle, TokenSupplier, TokenUpdate};

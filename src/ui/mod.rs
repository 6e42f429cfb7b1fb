// UI module - terminal controller, bridge and Slint wiring
//
// This module contains:
// - Bridge: relays inbound chunks from the worker into the Slint event loop
// - UiController: headless owner of the scrollback, input and session state
// - GuiController: Slint window, renderer and callbacks around a UiController

pub mod bridge;
pub mod controller;
pub mod gui;

pub use bridge::{Bridge, BridgeExit, NotifyError, UiNotifier};
pub use controller::{JoinReport, PendingJoin, Renderer, ShutdownReason, UiController, display_text};
pub use gui::GuiController;

//! # fludrive-core
//!
//! Core library for driving Flutter apps on iOS and Android devices.
//!
//! This crate turns high-level gesture commands into the element commands an
//! instrumented Flutter app understands, and manages the platform proxy
//! driver a session delegates device-level work to.
//!
//! ## Modules
//!
//! - [`element`] - Element locators and Flutter finders
//! - [`driver`] - Transport and condition-waiter traits, and [`driver::DriverError`]
//! - [`gesture`] - Validation and translation of `scroll`, `longTap` and `scrollIntoView`
//! - [`scroll_until`] - The scroll-until-visible/tappable retry engine
//! - [`proxy`] - Platform selection and the session's proxy driver binding
//! - [`session`] - Session start and teardown
//! - [`commands`] - Execute-script parsing and dispatch
//! - [`config`] - Persistent driver configuration
//!
//! ## External Collaborators
//!
//! The crate does not ship a transport. Callers provide an
//! [`driver::ElementCommandExecutor`] that reaches the app, and one
//! [`proxy::ProxySessionFactory`] per platform.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fludrive_core::config::DriverConfig;
//! use fludrive_core::driver::ElementCommandExecutor;
//! use fludrive_core::element::Finder;
//! use fludrive_core::proxy::ProxyFactories;
//! use fludrive_core::scroll_until::ScrollUntilSpec;
//! use fludrive_core::session::FlutterDriver;
//!
//! # async fn example(
//! #     transport: Arc<dyn ElementCommandExecutor>,
//! #     factories: ProxyFactories,
//! # ) -> Result<(), fludrive_core::driver::DriverError> {
//! let driver = FlutterDriver::new(DriverConfig::load(), transport, factories);
//!
//! let list = Finder::by_value_key("item-list").to_locator();
//! let item = Finder::by_text("Item 42").to_locator();
//! let spec = ScrollUntilSpec::new(item, 0.0, -300.0).with_wait_timeout(10_000);
//! driver.scroll_until_visible(&list, &spec).await?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod driver;
pub mod element;
pub mod gesture;
pub mod proxy;
pub mod scroll_until;
pub mod session;

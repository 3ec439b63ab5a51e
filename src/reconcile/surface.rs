//! The operations a display toolkit must provide to host the panel.
//!
//! The engine decides what to create and destroy; a surface only paints. Navigation
//! controls belong to the surface and are never created or destroyed through
//! this trait.

use crate::core::errors::Result;
use crate::reconcile::notices::Notice;
use crate::store::model::ButtonConfig;

/// Handle to an element created by a surface.
pub type ElementId = u64;

pub trait Surface {
    /// Create one button element. The id must stay valid until destroyed.
    fn create_button(&mut self, button: &ButtonConfig) -> Result<ElementId>;

    /// Destroy an element previously returned by [`Surface::create_button`].
    fn destroy_element(&mut self, id: ElementId);

    fn set_background(&mut self, color: &str);

    /// Point the embedded web view at `url`. Called only when the URL changes.
    fn load_web_view(&mut self, url: &str);

    fn show_web_view(&mut self);

    fn hide_web_view(&mut self);

    /// Replace the displayed notices (oldest first).
    fn show_notices(&mut self, notices: &[Notice]);

    /// Whether the host window still exists. Nothing is called on a dead surface.
    fn is_alive(&self) -> bool;
}

// Steam Audio backed implementation of the renderer interface.
//
// Everything in here runs on the audio thread after engine startup; the
// control thread never touches these types directly.

mod effects;
mod hrtf;
mod renderer;

pub use renderer::SteamRenderer;

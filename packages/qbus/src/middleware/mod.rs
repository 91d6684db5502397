//! Handler composition layer.
//!
//! Each wrapper here is itself a [`Handler`](crate::handler::Handler)
//! around inner handlers, so wrappers nest without bound:
//!
//! 1. **Routing** (`route`): a [`Selector`] picks one of several handlers
//! 2. **Sampling** (`sample`): fail a fraction of requests on purpose
//! 3. **A/B** (`sample::AbSplit`): split traffic between two handlers
//! 4. **Fallback** (`fallback`): swap in a secondary when the primary errors
//! 5. **Filtering** (`filter`): silently skip messages a predicate rejects
//!
//! The registry knows nothing about any of this; it just binds whatever
//! handler it is given. Randomized wrappers own a seedable RNG so tests
//! can pin their behavior.

pub mod fallback;
pub mod filter;
pub mod route;
pub mod sample;

pub use fallback::Fallback;
pub use filter::Filter;
pub use route::{RandomSelection, Route, Selector};
pub use sample::{AbSplit, Sample};

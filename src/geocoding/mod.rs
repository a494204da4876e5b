pub mod cancel;
pub mod geocoder;
pub mod pipeline;
pub mod venue_resolver;

pub use cancel::CancellationToken;
pub use geocoder::Geocoder;
pub use pipeline::{GeocodingPipeline, PipelineReport, PipelineSettings, VenueUpdate};
pub use venue_resolver::{ResolveError, VenueOutcome, VenueResolver, VenueSource};

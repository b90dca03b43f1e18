pub mod edge_services;
pub mod link_resolver_services;
pub mod stream_relay_services;

pub use link_resolver_services::DynLinkResolverService;
pub use stream_relay_services::DynStreamRelayService;

//! Drives the admin router end to end, with local stand-ins for the subgraph.
#[cfg(test)]
mod admin_routes;

// HTTP API routes.

pub mod collab;

// Wire protocol shared between the editing surface and the server.

pub mod collab;

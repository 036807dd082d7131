mod conflict;
pub mod ignore;
pub mod persist;
pub mod resource;
pub mod state;
pub mod transfer;
pub mod tree;

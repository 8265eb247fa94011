pub mod verify_internal;

//! Saving and loading layer stacks

pub mod disk_io;

pub use disk_io::{
    compress_stack, decompress_stack, delete_stack, deserialize_stack, load_stack, save_stack,
    serialize_stack, stack_exists, stack_path,
};

//! Integration tests for mystack on a live cluster
//!
//! Tests are organized by the story they tell:
//!
//! - `stack_lifecycle`: a user starts a stack, lists its apps, and stops it;
//!   conflicts and missing stacks are reported with their exact messages
//!
//! Each test uses its own username so runs do not collide, and deletes its
//! namespace on the way out.

mod helpers;
mod stack_lifecycle;

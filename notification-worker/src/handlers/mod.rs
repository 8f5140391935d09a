//! Notification handlers bound to queues at startup.

pub mod user_verification;

pub use user_verification::{
    UserVerificationEmailHandler, UserVerificationMessage, USER_VERIFICATION_QUEUE,
};

pub mod assignment;
pub mod otp;
pub mod sms;

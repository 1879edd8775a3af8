pub mod parcel;
pub mod payment;
pub mod rider;
pub mod tracking;
pub mod user;
pub mod withdrawal;

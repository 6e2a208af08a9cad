//! Integration tests for skillsync-google
//!
//! Uses wiremock to stand in for the Calendar, Drive, Sheets and Docs APIs
//! and checks request shapes, error classification and retry behavior.

mod common;

mod test_calendar;
mod test_client;
mod test_drive;

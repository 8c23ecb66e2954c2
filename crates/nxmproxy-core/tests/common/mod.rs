pub mod fake_handler;

mod audit_log_tests;
mod recovery_tests;
mod support;

pub use self::security::ConnectionSecurity;

mod security;

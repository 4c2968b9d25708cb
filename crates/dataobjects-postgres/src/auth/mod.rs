//! Password authentication helpers.

pub mod scram;

pub use scram::ScramClient;

use std::fmt::Write;

/// Compute MD5 password hash as per PostgreSQL protocol.
///
/// `"md5" + md5(md5(password + user) + salt)` in lower-case hex.
pub fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = format!("{}{}", password, user);
    let inner_hash = md5::compute(inner.as_bytes());

    let mut outer_input = format!("{:x}", inner_hash).into_bytes();
    outer_input.extend_from_slice(&salt);
    let outer_hash = md5::compute(&outer_input);

    let mut result = String::with_capacity(35);
    result.push_str("md5");
    // Writing to a String cannot fail.
    let _ = write!(&mut result, "{:x}", outer_hash);
    result
}

mod support;

mod test_oauth2;
mod test_password_reset;
mod test_totp;
mod test_two_factor_tokens;

mod test_claims;
mod test_user;

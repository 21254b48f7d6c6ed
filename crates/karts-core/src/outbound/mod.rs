pub mod mock_auth;

use bs58;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid Solana address format: {0}")]
    InvalidSolanaAddress(String),

    #[error("Invalid game id: {0}")]
    InvalidGameId(String),
}

pub fn validate_solana_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    let decoded = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return Err(ValidationError::InvalidSolanaAddress(address.to_string())),
    };

    // Public keys are 32 bytes
    if decoded.len() != 32 {
        return Err(ValidationError::InvalidSolanaAddress(address.to_string()));
    }

    Ok(())
}

pub fn validate_game_id(game_id: &str) -> Result<(), ValidationError> {
    if game_id.trim().is_empty() {
        return Err(ValidationError::MissingParameter("game_id".to_string()));
    }

    let valid = game_id.len() <= 64
        && game_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ValidationError::InvalidGameId(game_id.to_string()));
    }

    Ok(())
}

/// Game id from a client route such as `/game/dice-42` or `/game/dice-42/history`.
pub fn game_id_from_route(route: &str) -> Option<&str> {
    let rest = route.split("/game/").nth(1)?;
    let id = rest.split(['/', '?', '#']).next()?;
    validate_game_id(id).ok().map(|_| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_32_byte_base58_keys() {
        assert_eq!(validate_solana_address("11111111111111111111111111111111"), Ok(()));
        assert_eq!(
            validate_solana_address("6o1iE4cKQcjW4UFd4vn35r43qD9LjNDhPGNUMBuS8ocZ"),
            Ok(())
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(matches!(
            validate_solana_address("   "),
            Err(ValidationError::MissingParameter(_))
        ));
        // 0, O, I and l are outside the base58 alphabet
        assert!(matches!(
            validate_solana_address("0OIl"),
            Err(ValidationError::InvalidSolanaAddress(_))
        ));
        assert!(matches!(
            validate_solana_address("abc"),
            Err(ValidationError::InvalidSolanaAddress(_))
        ));
    }

    #[test]
    fn parses_game_routes() {
        assert_eq!(game_id_from_route("/game/dice-42"), Some("dice-42"));
        assert_eq!(game_id_from_route("/game/crash_7/history?tab=1"), Some("crash_7"));
        assert_eq!(game_id_from_route("/profile"), None);
        assert_eq!(game_id_from_route("/game/"), None);
    }
}

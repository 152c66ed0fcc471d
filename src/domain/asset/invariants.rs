use super::entity::AssetDescriptor;
use crate::domain::{DomainError, DomainResult};

/// Validates all AssetDescriptor invariants
pub fn validate_asset(asset: &AssetDescriptor) -> DomainResult<()> {
    validate_id(asset)?;
    Ok(())
}

/// Id must be non-empty and free of control characters
fn validate_id(asset: &AssetDescriptor) -> DomainResult<()> {
    if asset.id.trim().is_empty() {
        return Err(DomainError::InvariantViolation(
            "Asset id cannot be empty".to_string(),
        ));
    }

    if asset.id.chars().any(char::is_control) {
        return Err(DomainError::InvariantViolation(format!(
            "Asset id contains control characters: {:?}",
            asset.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_asset() {
        let asset = AssetDescriptor::image("img-1");
        assert!(validate_asset(&asset).is_ok());
    }

    #[test]
    fn test_empty_id_fails() {
        let asset = AssetDescriptor::video("   ");

        let result = validate_asset(&asset);
        if let Err(DomainError::InvariantViolation(msg)) = result {
            assert!(msg.contains("cannot be empty"));
        } else {
            panic!("Expected InvariantViolation error");
        }
    }

    #[test]
    fn test_control_characters_fail() {
        let asset = AssetDescriptor::image("img\n1");
        assert!(validate_asset(&asset).is_err());
    }

    #[test]
    fn test_path_like_ids_are_accepted() {
        // Ids are opaque; cache file names are derived from a digest
        let asset = AssetDescriptor::image("../album/IMG_0001");
        assert!(validate_asset(&asset).is_ok());
    }
}

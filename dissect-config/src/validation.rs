//! Custom validation functions for configuration.

use dissect_mem::AllocatorKind;
use validator::ValidationError;

use crate::scopes::ScopesConfig;

/// The process arena lives for the whole run and is never bulk-freed, so it
/// may not use a strategy that ignores single frees. The override applies to
/// it as well.
pub fn validate_scope_kinds(scopes: &ScopesConfig) -> Result<(), ValidationError> {
    let process = scopes.kind_override.unwrap_or(scopes.process);
    if process.reclaims_frees() {
        Ok(())
    } else {
        let mut error = ValidationError::new("process_scope_never_reclaims");
        error.message = Some(
            format!("the process scope cannot use '{process}': single frees would never be reclaimed")
                .into(),
        );
        Err(error)
    }
}

/// Validate that a log filter holds at least one non-blank directive.
pub fn validate_log_filter(filter: &str) -> Result<(), ValidationError> {
    let has_directive = filter.split(',').any(|directive| !directive.trim().is_empty());
    if has_directive {
        Ok(())
    } else {
        Err(ValidationError::new("empty_log_filter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_scope_rejects_block_fast() {
        let scopes = ScopesConfig {
            process: AllocatorKind::BlockFast,
            ..ScopesConfig::default()
        };
        assert!(validate_scope_kinds(&scopes).is_err());
        assert!(validate_scope_kinds(&ScopesConfig::default()).is_ok());
    }

    #[test]
    fn test_override_counts_for_process_scope() {
        let scopes = ScopesConfig {
            kind_override: Some(AllocatorKind::BlockFast),
            ..ScopesConfig::default()
        };
        assert!(validate_scope_kinds(&scopes).is_err());
    }

    #[test]
    fn test_log_filter() {
        assert!(validate_log_filter("dissect_mem=debug,info").is_ok());
        assert!(validate_log_filter(" , ").is_err());
    }
}

use std::any::Any;

pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Best-effort rendering of a panic payload for logs.
pub(crate) fn panic_payload_as_str(payload: &PanicPayload) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Box<dyn Any>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::static_str(Box::new("boom"), "boom")]
    #[case::string(Box::new(String::from("kaboom")), "kaboom")]
    #[case::opaque(Box::new(42u32), "Box<dyn Any>")]
    fn test_panic_payload_as_str(#[case] payload: PanicPayload, #[case] expected: &str) {
        assert_eq!(panic_payload_as_str(&payload), expected);
    }
}

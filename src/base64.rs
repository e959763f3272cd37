//! Standard-alphabet, padded base64, as used by `AUTH LOGIN` and RFC 2047 encoded words

use ::base64::{
    engine::{general_purpose::STANDARD, Engine},
    DecodeError,
};

pub(crate) fn encode<T: AsRef<[u8]>>(input: T) -> String {
    STANDARD.encode(input)
}

pub(crate) fn decode<T: AsRef<[u8]>>(input: T) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(input)
}

#[cfg(test)]
mod test {
    use super::{decode, encode};

    #[test]
    fn encode_login_values() {
        assert_eq!(encode("user@example.com"), "dXNlckBleGFtcGxlLmNvbQ==");
        assert_eq!(encode("app-pass"), "YXBwLXBhc3M=");
        assert_eq!(encode("Username:"), "VXNlcm5hbWU6");
        assert_eq!(encode(""), "");
    }

    #[test]
    fn output_is_padded_and_unwrapped() {
        let long = "x".repeat(200);
        let encoded = encode(&long);
        assert_eq!(encoded.len() % 4, 0);
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('\r'));
    }

    #[test]
    fn round_trip_every_remainder() {
        let credential = "sëcret-app-pässword";
        for len in 0..credential.len() {
            let input = &credential.as_bytes()[..len];
            let encoded = encode(input);
            assert_eq!(encoded.len() % 4, 0);
            assert_eq!(decode(&encoded).unwrap(), input);
        }
    }
}

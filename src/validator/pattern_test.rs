/*
 * Licensed to the Apache Software Foundation (ASF) under one or more
 * contributor license agreements.  See the NOTICE file distributed with
 * this work for additional information regarding copyright ownership.
 * The ASF licenses this file to You under the Apache License, Version 2.0
 * (the "License"); you may not use this file except in compliance with
 * the License.  You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

#[cfg(test)]
mod tests {
    use crate::options::Options;
    use crate::validator::errors::ErrorKind;
    use crate::validator::property::{Location, Property};
    use crate::validator::Validator;
    use serde_json::json;
    use std::sync::Arc;

    const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
    const PHONE_PATTERN: &str = r"^\+?[0-9]{7,15}$";
    const SSN_PATTERN: &str = r"^\d{3}-\d{2}-\d{4}$";

    struct TestCase {
        name: &'static str,
        pattern: &'static str,
        valid_values: Vec<&'static str>,
        invalid_values: Vec<&'static str>,
    }

    impl TestCase {
        const fn new(
            name: &'static str,
            pattern: &'static str,
            valid_values: Vec<&'static str>,
            invalid_values: Vec<&'static str>,
        ) -> Self {
            Self {
                name,
                pattern,
                valid_values,
                invalid_values,
            }
        }
    }

    fn header(name: &str, schema: serde_json::Value, value: &str) -> Property {
        Property::new(name, Location::Header, true, schema, Some(json!(value)))
    }

    #[test]
    fn test_pattern_validation() {
        let cases = vec![
            TestCase::new(
                "X-Email",
                EMAIL_PATTERN,
                vec!["user@example.com", "first.last+tag@sub.example.org"],
                vec!["user.example.com", "@example.com"],
            ),
            TestCase::new(
                "X-Phone",
                PHONE_PATTERN,
                vec!["+358501234567", "5551234"],
                vec!["phone", "+12"],
            ),
            TestCase::new(
                "X-Ssn",
                SSN_PATTERN,
                vec!["123-45-6789"],
                vec!["123456789", "12-345-6789"],
            ),
        ];

        let validator = Validator::new(&Options::default());
        for case in cases {
            let schema = json!({"type": "string", "pattern": case.pattern});
            for value in &case.valid_values {
                let errors = validator
                    .validate_properties(&[header(case.name, schema.clone(), value)])
                    .unwrap();
                assert!(errors.is_empty(), "{} should accept {}", case.name, value);
            }
            for value in &case.invalid_values {
                let errors = validator
                    .validate_properties(&[header(case.name, schema.clone(), value)])
                    .unwrap();
                assert_eq!(errors.len(), 1, "{} should reject {}", case.name, value);
                assert_eq!(errors[0].name, case.name);
                assert_eq!(errors[0].code(), "error_pattern");
                assert_eq!(
                    errors[0].kind,
                    ErrorKind::Constraint {
                        keyword: "pattern".to_string(),
                        limit: Some(json!(case.pattern)),
                        value: json!(value),
                    }
                );
            }
        }
    }

    #[test]
    fn test_string_formats() {
        struct Tests {
            format: &'static str,
            value: &'static str,
            assert: bool,
        }

        let tests = [
            Tests { format: "email", value: "foo@bar.com", assert: true },
            Tests { format: "email", value: "foo.bar.com", assert: false },
            Tests { format: "date", value: "2014-12-23", assert: true },
            Tests { format: "date", value: "2014-02-31", assert: false },
            Tests { format: "date-time", value: "2014-12-23T10:00:00+02:00", assert: true },
            Tests { format: "uuid", value: "00000000-0000-0000-0000-000000000000", assert: true },
            Tests { format: "uuid", value: "not-a-uuid", assert: false },
            Tests { format: "ipv4", value: "10.0.0.1", assert: true },
            Tests { format: "ipv4", value: "10.0.0", assert: false },
            Tests { format: "byte", value: "T0s=", assert: true },
        ];

        let validator = Validator::new(&Options::default());
        for test in tests {
            let schema = json!({"type": "string", "format": test.format});
            let errors = validator
                .validate_properties(&[Property::new(
                    test.format,
                    Location::Query,
                    false,
                    schema,
                    Some(json!(test.value)),
                )])
                .unwrap();
            assert_eq!(
                errors.is_empty(),
                test.assert,
                "format {} with {}",
                test.format,
                test.value
            );
            if !test.assert {
                assert_eq!(errors[0].code(), "error_format");
            }
        }
    }

    #[test]
    fn test_custom_format() {
        let validator = Validator::new(&Options::default());
        validator.add_format("string", "customFormat", Arc::new(|v: &str| v == "OK"));
        let schema = json!({"type": "string", "format": "customFormat"});

        let ok = Property::new("custom", Location::Query, false, schema.clone(), Some(json!("OK")));
        assert!(validator.validate_properties(&[ok]).unwrap().is_empty());

        let bad = Property::new("custom", Location::Query, false, schema, Some(json!("NOK")));
        let errors = validator.validate_properties(&[bad]).unwrap();
        assert_eq!(
            errors[0].kind,
            ErrorKind::Format {
                format: "customFormat".to_string(),
                value: json!("NOK"),
            }
        );
    }
}

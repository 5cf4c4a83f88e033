pub mod ast {
    macro_rules! or {
        ($left:expr, $right:expr) => {
            $crate::ast::Node::or($left, $right)
        };
    }

    macro_rules! and {
        ($left:expr, $right:expr) => {
            $crate::ast::Node::and($left, $right)
        };
    }

    macro_rules! not {
        ($value:expr) => {
            $crate::ast::Node::negate($value)
        };
    }

    macro_rules! variable {
        ($name:expr) => {
            $crate::ast::Node::variable($name)
        };
    }

    #[allow(unused_imports)]
    pub(crate) use and;
    #[allow(unused_imports)]
    pub(crate) use not;
    #[allow(unused_imports)]
    pub(crate) use or;
    #[allow(unused_imports)]
    pub(crate) use variable;
}

pub mod predicates {
    macro_rules! is_null {
        ($name:expr) => {
            $crate::ast::Node::is_null($crate::ast::NullOp::IsNull, $name)
        };
    }

    macro_rules! is_not_null {
        ($name:expr) => {
            $crate::ast::Node::is_null($crate::ast::NullOp::IsNotNull, $name)
        };
    }

    macro_rules! is_empty {
        ($name:expr) => {
            $crate::ast::Node::is_null($crate::ast::NullOp::IsEmpty, $name)
        };
    }

    macro_rules! set_in {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::set_with_literal($crate::ast::SetOp::In, $name, $value)
        };
    }

    macro_rules! set_not_in {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::set_with_literal($crate::ast::SetOp::NotIn, $name, $value)
        };
    }

    macro_rules! equal {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::equality($crate::ast::EqualityOp::Equal, $name, $value)
        };
    }

    macro_rules! not_equal {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::equality($crate::ast::EqualityOp::NotEqual, $name, $value)
        };
    }

    macro_rules! less_than {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::compare($crate::ast::CompareOp::LessThan, $name, $value)
        };
    }

    macro_rules! less_than_equal {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::compare($crate::ast::CompareOp::LessThanEqual, $name, $value)
        };
    }

    macro_rules! greater_than {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::compare($crate::ast::CompareOp::GreaterThan, $name, $value)
        };
    }

    macro_rules! greater_than_equal {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::compare($crate::ast::CompareOp::GreaterThanEqual, $name, $value)
        };
    }

    macro_rules! all_of {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::list($crate::ast::ListOp::AllOf, $name, $value)
        };
    }

    macro_rules! one_of {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::list($crate::ast::ListOp::OneOf, $name, $value)
        };
    }

    macro_rules! none_of {
        ($name:expr, $value:expr) => {
            $crate::ast::Node::list($crate::ast::ListOp::NoneOf, $name, $value)
        };
    }

    macro_rules! comparison_float {
        ($value:expr) => {
            $crate::ast::CompareValue::Float($value)
        };
    }

    macro_rules! comparison_integer {
        ($value:expr) => {
            $crate::ast::CompareValue::Integer($value)
        };
    }

    macro_rules! string_list {
        ($value:expr) => {
            $crate::ast::ListLiteral::StringList(
                $value
                    .into_iter()
                    .map($crate::values::StringValue::new)
                    .collect(),
            )
        };
    }

    macro_rules! integer_list {
        ($value:expr) => {
            $crate::ast::ListLiteral::IntegerList($value)
        };
    }

    macro_rules! primitive_integer {
        ($value:expr) => {
            $crate::ast::EqualityValue::Integer($value)
        };
    }

    macro_rules! primitive_float {
        ($value:expr) => {
            $crate::ast::EqualityValue::Float($value)
        };
    }

    macro_rules! primitive_string {
        ($value:expr) => {
            $crate::ast::EqualityValue::String($crate::values::StringValue::new($value))
        };
    }

    pub(crate) use all_of;
    pub(crate) use comparison_float;
    pub(crate) use comparison_integer;
    pub(crate) use equal;
    pub(crate) use greater_than;
    #[allow(unused_imports)]
    pub(crate) use greater_than_equal;
    pub(crate) use integer_list;
    pub(crate) use is_empty;
    pub(crate) use is_not_null;
    pub(crate) use is_null;
    pub(crate) use less_than;
    pub(crate) use less_than_equal;
    pub(crate) use none_of;
    pub(crate) use not_equal;
    pub(crate) use one_of;
    #[allow(unused_imports)]
    pub(crate) use primitive_float;
    pub(crate) use primitive_integer;
    pub(crate) use primitive_string;
    pub(crate) use set_in;
    pub(crate) use set_not_in;
    pub(crate) use string_list;
}

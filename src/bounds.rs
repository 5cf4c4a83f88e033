use crate::{
    ast::{
        BoolExpr, CompareOp, CompareValue, EqualityOp, EqualityValue, Expr, ListLiteral, ListOp,
        Node, SetLeft, SetOp, SetRight,
    },
    values::{fne, AttrDomain, AttributeTable, ValueBound, ValueKind},
};

/// The tightest range of values of the domain's attribute for which the
/// expression could still evaluate to true. Expressions that are not affected
/// by the attribute fall back to the full domain, so they are replicated
/// across every cluster.
pub(crate) fn variable_bound(domain: &AttrDomain, node: &Node) -> ValueBound {
    simple_variable_bound(domain, node, false).unwrap_or(domain.bound)
}

fn compare_bound(domain: &AttrDomain, op: CompareOp, value: &CompareValue) -> ValueBound {
    match (value, &domain.bound) {
        (CompareValue::Integer(constant), ValueBound::Integer { min, max }) => match op {
            CompareOp::LessThan => ValueBound::Integer {
                min: *min,
                max: constant.saturating_sub(1),
            },
            CompareOp::LessThanEqual => ValueBound::Integer {
                min: *min,
                max: *constant,
            },
            CompareOp::GreaterThan => ValueBound::Integer {
                min: constant.saturating_add(1),
                max: *max,
            },
            CompareOp::GreaterThanEqual => ValueBound::Integer {
                min: *constant,
                max: *max,
            },
        },
        (CompareValue::Float(constant), ValueBound::Float { min, max }) => match op {
            CompareOp::LessThan => ValueBound::Float {
                min: *min,
                max: constant - f64::EPSILON,
            },
            CompareOp::LessThanEqual => ValueBound::Float {
                min: *min,
                max: *constant,
            },
            CompareOp::GreaterThan => ValueBound::Float {
                min: constant + f64::EPSILON,
                max: *max,
            },
            CompareOp::GreaterThanEqual => ValueBound::Float {
                min: *constant,
                max: *max,
            },
        },
        (value, bound) => {
            unreachable!("comparison of {value:?} against the domain bound {bound:?}; this is a bug")
        }
    }
}

fn equality_bound(value: &EqualityValue) -> ValueBound {
    match value {
        EqualityValue::Integer(constant) => ValueBound::Integer {
            min: *constant,
            max: *constant,
        },
        EqualityValue::Float(constant) => ValueBound::Float {
            min: *constant,
            max: *constant,
        },
        EqualityValue::String(value) => ValueBound::Str {
            min: value.id.0,
            max: value.id.0,
        },
        EqualityValue::IntegerEnum { id, .. } => ValueBound::Str {
            min: id.0,
            max: id.0,
        },
    }
}

fn integer_list_bound(values: &[i64]) -> Option<ValueBound> {
    let first = *values.first()?;
    let last = *values.last()?;
    Some(ValueBound::Integer {
        min: first,
        max: last,
    })
}

fn string_list_bound(values: &[crate::values::StringValue]) -> Option<ValueBound> {
    let first = values.first()?.id.0;
    let last = values.last()?.id.0;
    Some(ValueBound::Str {
        min: first,
        max: last,
    })
}

fn simple_variable_bound(domain: &AttrDomain, node: &Node, inverted: bool) -> Option<ValueBound> {
    let var = domain.var;
    match &node.expr {
        Expr::Compare { op, attr, value } => {
            if attr.var != var {
                return None;
            }
            let op = if inverted { op.inverted() } else { *op };
            Some(compare_bound(domain, op, value))
        }
        Expr::Equality { op, attr, value } => {
            if attr.var != var {
                return None;
            }
            let equal = matches!(op, EqualityOp::Equal) != inverted;
            if equal {
                Some(equality_bound(value))
            } else {
                // Any value but the constant could match.
                Some(domain.bound)
            }
        }
        Expr::Bool(bool_expr) => match bool_expr {
            BoolExpr::Literal(_) => None,
            BoolExpr::Variable(attr) => {
                if attr.var != var {
                    return None;
                }
                Some(ValueBound::Boolean {
                    min: !inverted,
                    max: !inverted,
                })
            }
            BoolExpr::Not(child) => simple_variable_bound(domain, child, !inverted),
            BoolExpr::And(lhs, rhs) | BoolExpr::Or(lhs, rhs) => {
                let is_or = matches!(bool_expr, BoolExpr::Or(_, _)) != inverted;
                let left = simple_variable_bound(domain, lhs, inverted);
                let right = simple_variable_bound(domain, rhs, inverted);
                match (left, right) {
                    (None, None) => None,
                    (Some(bound), None) | (None, Some(bound)) => {
                        if is_or {
                            // The untouched side can be true for any value.
                            Some(domain.bound)
                        } else {
                            Some(bound)
                        }
                    }
                    (Some(left), Some(right)) => Some(left.union(&right)),
                }
            }
        },
        Expr::Set { op, left, right } => {
            let affected = matches!(left, SetLeft::Variable(attr) if attr.var == var)
                || matches!(right, SetRight::Variable(attr) if attr.var == var);
            if !affected {
                return None;
            }
            let is_in = matches!(op, SetOp::In) != inverted;
            if !is_in {
                return Some(domain.bound);
            }
            match (left, right) {
                (SetLeft::Variable(_), SetRight::IntegerList(values)) => {
                    integer_list_bound(values).or(Some(domain.bound))
                }
                (SetLeft::Variable(_), SetRight::StringList(values)) => {
                    string_list_bound(values).or(Some(domain.bound))
                }
                (SetLeft::Integer(value), SetRight::Variable(_)) => Some(ValueBound::Integer {
                    min: *value,
                    max: *value,
                }),
                (SetLeft::String(value), SetRight::Variable(_)) => Some(ValueBound::Str {
                    min: value.id.0,
                    max: value.id.0,
                }),
                (left, right) => {
                    unreachable!("set expression between {left:?} and {right:?}; this is a bug")
                }
            }
        }
        Expr::List { op, attr, value } => {
            if attr.var != var {
                return None;
            }
            let positive = match op {
                ListOp::OneOf => !inverted,
                ListOp::AllOf => !inverted,
                ListOp::NoneOf => inverted,
            };
            if !positive {
                return Some(domain.bound);
            }
            match value {
                ListLiteral::IntegerList(values) => {
                    integer_list_bound(values).or(Some(domain.bound))
                }
                ListLiteral::StringList(values) => {
                    string_list_bound(values).or(Some(domain.bound))
                }
            }
        }
        Expr::IsNull { .. } => None,
        Expr::Special(_) => None,
    }
}

/// Grow attribute bounds from the evidence in an expression. Unbounded
/// sentinels are replaced by the first evidence; bounded domains only ever
/// widen.
pub(crate) fn widen_domains(attributes: &mut AttributeTable, node: &Node) {
    for index in 0..attributes.len() {
        let var = crate::values::VariableId(index);
        let domain = attributes.domain(var);
        match domain.kind {
            ValueKind::Boolean | ValueKind::Segments | ValueKind::FrequencyCaps => continue,
            ValueKind::String | ValueKind::StringList | ValueKind::IntegerEnum => {
                // Interned ids are dense, so the table length is the evidence.
                let count = match domain.kind {
                    ValueKind::IntegerEnum => {
                        domain.ienums.as_ref().map(|table| table.len()).unwrap_or(0)
                    }
                    _ => domain.strings.as_ref().map(|table| table.len()).unwrap_or(0),
                };
                if count == 0 {
                    continue;
                }
                let evidence = count - 1;
                let domain = attributes.domain_mut(var);
                if let ValueBound::Str { max, .. } = &mut domain.bound {
                    if *max < usize::MAX - 1 {
                        *max = (*max).max(evidence);
                    } else {
                        *max = evidence;
                    }
                }
            }
            ValueKind::Integer | ValueKind::IntegerList => {
                let Some(ValueBound::Integer {
                    min: bmin,
                    max: bmax,
                }) = simple_variable_bound(domain, node, false)
                else {
                    continue;
                };
                let domain = attributes.domain_mut(var);
                if let ValueBound::Integer { min, max } = &mut domain.bound {
                    if *min != i64::MIN {
                        *min = (*min).min(bmin);
                    } else {
                        *min = bmin;
                    }
                    if *max != i64::MAX {
                        *max = (*max).max(bmax);
                    } else {
                        *max = bmax;
                    }
                }
            }
            ValueKind::Float => {
                let Some(ValueBound::Float {
                    min: bmin,
                    max: bmax,
                }) = simple_variable_bound(domain, node, false)
                else {
                    continue;
                };
                let domain = attributes.domain_mut(var);
                if let ValueBound::Float { min, max } = &mut domain.bound {
                    if fne(*min, -f64::MAX) {
                        *min = min.min(bmin);
                    } else {
                        *min = bmin;
                    }
                    if fne(*max, f64::MAX) {
                        *max = max.max(bmax);
                    } else {
                        *max = bmax;
                    }
                }
            }
        }
    }
}
